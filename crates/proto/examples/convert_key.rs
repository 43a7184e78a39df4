//! Key Conversion Example
//!
//! This example demonstrates how to:
//! - Detect the format of a private key file
//! - Decode it with an optional passphrase
//! - Print its fingerprints
//! - Export it as an ssh.com private key and an OpenSSH public key
//!
//! Usage:
//!   cargo run --example convert_key <key file> [passphrase] [output.key]
//!
//! Example:
//!   RUST_LOG=debug cargo run --example convert_key id_rsa.ppk secret id_rsa.key

use burrow_proto::ssh::privatekey::PrivateKeyLoader;
use burrow_proto::ssh::UserAuthKey;
use secrecy::SecretString;
use std::env;
use std::fs::File;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 4 {
        eprintln!("Usage: {} <key file> [passphrase] [output.key]", args[0]);
        eprintln!("Example: {} id_rsa.ppk secret id_rsa.key", args[0]);
        std::process::exit(1);
    }

    let path = &args[1];
    let passphrase = args
        .get(2)
        .filter(|p| !p.is_empty())
        .map(|p| SecretString::from(p.clone()));

    let loader = PrivateKeyLoader::from_file(path)?;
    println!("Format: {}", loader.format().name());

    let (key_pair, comment) = match loader.load_ssh2_private_key(passphrase.as_ref()) {
        Ok(loaded) => loaded,
        Err(e) if e.is_wrong_passphrase() => {
            eprintln!("✗ {}", e);
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };
    let key = UserAuthKey::new(key_pair).with_comment(comment);

    println!("✓ Loaded {} key ({} bits)", key.key_pair().algorithm_name(), key.key_pair().bits());
    if !key.comment().is_empty() {
        println!("  Comment: {}", key.comment());
    }
    println!("  MD5:    {}", key.fingerprint_md5());
    println!("  SHA256: {}", key.fingerprint_sha256());

    println!();
    key.write_public_openssh(&mut std::io::stdout())?;

    if let Some(output) = args.get(3) {
        let mut file = File::create(output)?;
        key.write_private_secsh(&mut file, key.comment(), passphrase.as_ref())?;
        println!();
        println!("✓ Wrote ssh.com private key to {}", output);
    }

    Ok(())
}
