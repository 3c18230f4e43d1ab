use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, bail};
use authd_core::SigningKey;
use authd_core::keys::MIN_KEY_BITS;
use authd_core::secret::hash_password;

use crate::cli::GenkeyArgs;

/// Generates a PKCS#1 private key and writes it to `args.output` or stdout.
pub fn genkey(args: &GenkeyArgs, stdout: &mut impl Write) -> anyhow::Result<()> {
    if args.size < MIN_KEY_BITS {
        bail!("key size must be at least {MIN_KEY_BITS} bits");
    }
    let key = SigningKey::generate(args.size, args.id.trim(), false)
        .context("key generation failed")?;
    let pem = key.to_pem().context("key encoding failed")?;

    match &args.output {
        Some(path) => write_private(path, pem.as_bytes())
            .with_context(|| format!("cannot write {}", path.display())),
        None => {
            stdout.write_all(pem.as_bytes())?;
            Ok(())
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

/// Reads one line from `input` and writes its Argon2id PHC hash.
pub fn hash_password_command(input: &mut impl BufRead, stdout: &mut impl Write) -> anyhow::Result<()> {
    let mut line = String::new();
    input.read_line(&mut line).context("cannot read password")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("password must not be empty");
    }
    let hash = hash_password(password).map_err(|e| anyhow::anyhow!("hashing failed: {e}"))?;
    writeln!(stdout, "{hash}")?;
    Ok(())
}
