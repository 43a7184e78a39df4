//! Shared fixtures for the key file tests.
//!
//! All encrypted fixtures use the passphrase [`PASSPHRASE`]. Integers are hex.

#![allow(dead_code)]

use burrow_proto::ssh::{DsaKeyPair, KeyPair, RsaKeyPair};
use num_bigint::BigUint;
use secrecy::SecretString;
use std::path::PathBuf;

pub const PASSPHRASE: &str = "burrow-test";

pub const RSA_E: &str = "10001";
pub const RSA_D: &str = "935aa6292ae415d80a77fd61be10cdc0b8e3d17f97654591313fd27900cab594494c547c4d3c75c6d1ff14f323e013504f10c4003a99d7a731b5d2fb998124f20a5d96a294a675848b80fe7089cb5b5eeb7bb6869a4a7b9e7ade6cd5a6b2ae7c483c7721fd6031850a66170b5e2c3579872145f4e42e78d3af3a6459507d3aa9";
pub const RSA_N: &str = "9fa0a4f1e12a720c93d5586bd5980139a2e8866885df7027a2d7b4bfec3ef55fe3f90d07019a4da77df6d6a678f37f202da334ec85406c0fa54357ff2c34b39b3de8146764137969a46006a4b8ee5a35341e516cd7f8e0ef8c4b4662891e9aad81e07ec72498aecc6b6703c97687d7687d308b701fb7c9186d51978e1f4d0419";
pub const RSA_U: &str = "8c23b95f4bac35619b945ff8beebc720838cc855eafa112c63795ed1d7b2598ed00ca0f568681d0fd5e04411b8b0efddaa08800548fc33f9e66ca033ee7cb29e";
pub const RSA_P: &str = "d1e961193bd0e1a6b749422a4e75fa9d5a8350e540ea65c657614abf54bf815b071d72e20b556e84fc3701b06c38b6117280ea900d139705a1e070acab6db85f";
pub const RSA_Q: &str = "c2acead6e1aa43d42714796772f9dee4cf4b751b7cd0ff44062f79823bfecd05fa86a812231895b9c33677c784c594c4ea5cb3d4f7fa154e84bb8927c2ab7687";
pub const DSA_P: &str = "a25252f5711d77c3c2877f8372aa286a7104409c0d6292ca4850558eecd11f39b58c144428a013946757d40918c8011edcda93563bc30b397237c2ea82d8a0f30035726af041717a824699d6e4f9329ae31ea8f09b3da3e2a95b8c7efc825abe5b0c2a02738a959a444a31821a9688e2fb0b107940966032fafcfd7192a5df85";
pub const DSA_Q: &str = "f297ad01f772cae1eccc9fb3968b4d7f6a03606b";
pub const DSA_G: &str = "349e4a48dccf51e9b3ea5ff1bc8908515cd1d4dca531b02fa284d8ad1dce14f0f64a36ed4467f15bb9c66c616f8f18ad8e2ccb50ffc883c626bb2ab23bbeff1a05e564ebf0f5269c76a6fea580eafb749bf9f86b205367592399d952f72f9767bd170537f339d92a60fdfc604afc58b472a440feb329a09591240201d3fc56a3";
pub const DSA_Y: &str = "629eb3985a670f9779c7a15ebaba52a66b529eeaf5700d82a52e3d1485f7a50ceac842e251ed78f68d82e06407388db5725e622a60de40afdb7facb3f30a5508068ef5590c0fdc5bf55b7babb3610f08cedea8c3cf5f02fa4bfa3ba1339eb339d414664a82b5bab86a5476152c1bd69fb8b9dd13163d13ac7bfa0f59f52f5e6d";
pub const DSA_X: &str = "bc07e9c587daff7a19068c653e635284f33399b";
pub const RSA_PUBLIC_LINE: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAAAgQCfoKTx4SpyDJPVWGvVmAE5ouiGaIXfcCei17S/7D71X+P5DQcBmk2nffbWpnjzfyAtozTshUBsD6VDV/8sNLObPegUZ2QTeWmkYAakuO5aNTQeUWzX+ODvjEtGYokemq2B4H7HJJiuzGtnA8l2h9dofTCLcB+3yRhtUZeOH00EGQ==";
pub const RSA_FINGERPRINT_MD5: &str = "2c:2f:ce:a8:cc:8a:02:4d:36:7c:16:dd:2b:fe:4c:af";
pub const RSA_FINGERPRINT_SHA256: &str = "SHA256:6cDZWuCiV8akG3JywveRKXdmCo197Hdz6doV827cdYc";

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn passphrase() -> SecretString {
    SecretString::from(PASSPHRASE.to_string())
}

pub fn int(hex: &str) -> BigUint {
    BigUint::parse_bytes(hex.as_bytes(), 16).expect("fixture integer")
}

pub fn assert_rsa_fixture(key: &KeyPair) {
    let KeyPair::Rsa(rsa) = key else {
        panic!("expected RSA key, got {:?}", key);
    };
    assert_rsa_values(rsa);
}

pub fn assert_rsa_values(rsa: &RsaKeyPair) {
    assert_eq!(rsa.e(), int(RSA_E));
    assert_eq!(rsa.d(), int(RSA_D));
    assert_eq!(rsa.n(), int(RSA_N));
    assert_eq!(rsa.u(), int(RSA_U));
    assert_eq!(rsa.p(), int(RSA_P));
    assert_eq!(rsa.q(), int(RSA_Q));
    assert_eq!(rsa.bits(), 1024);
}

pub fn assert_dsa_fixture(key: &KeyPair) {
    let KeyPair::Dsa(dsa) = key else {
        panic!("expected DSA key, got {:?}", key);
    };
    assert_dsa_values(dsa);
}

pub fn assert_dsa_values(dsa: &DsaKeyPair) {
    assert_eq!(dsa.p(), int(DSA_P));
    assert_eq!(dsa.q(), int(DSA_Q));
    assert_eq!(dsa.g(), int(DSA_G));
    assert_eq!(dsa.y(), int(DSA_Y));
    assert_eq!(dsa.x(), int(DSA_X));
}
