use anyhow::{Context, Result};
use secrecy::SecretVec;
use std::io::Read;
use std::path::Path;

/// Reads x25519 identities (`AGE-SECRET-KEY-1...`), one per line; blank lines and
/// `#` comments are skipped.
pub fn load_identities(path: &Path) -> Result<Vec<age::x25519::Identity>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("open identity {}", path.display()))?;
    let mut ids = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let id = line
            .parse::<age::x25519::Identity>()
            .map_err(|e| anyhow::anyhow!("{}:{}: {}", path.display(), n + 1, e))?;
        ids.push(id);
    }
    if ids.is_empty() {
        anyhow::bail!("no age identities in {}", path.display());
    }
    tracing::debug!(path = %path.display(), count = ids.len(), "loaded age identities");
    Ok(ids)
}

pub fn decrypt_age_bytes(rdr: impl Read, ids: &[age::x25519::Identity]) -> Result<SecretVec<u8>> {
    if ids.is_empty() {
        anyhow::bail!("encrypted config needs at least one --age-identity");
    }
    let decryptor = age::Decryptor::new(rdr).context("read age header")?;
    let mut reader = decryptor
        .decrypt(ids.iter().map(|i| i as &dyn age::Identity))
        .context("none of the given identities can decrypt this file")?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out).context("read decrypted payload")?;
    Ok(SecretVec::new(out))
}
