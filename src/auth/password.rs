use tracing::error;

/// Hash a plaintext password with the configured bcrypt cost.
pub fn hash_password(plain: &str, cost: u32) -> anyhow::Result<String> {
    let hash = bcrypt::hash(plain, cost).map_err(|e| {
        error!(error = %e, "bcrypt hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let ok = bcrypt::verify(plain, hash).map_err(|e| {
        error!(error = %e, "bcrypt verify error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(ok)
}

/// bcrypt is intentionally slow; run it off the request-handling runtime.
pub async fn hash_async(plain: String, cost: u32) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain, cost)).await?
}

pub async fn verify_async(plain: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash)).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    // bcrypt's minimum cost keeps the tests fast.
    const COST: u32 = 4;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password, COST).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password, COST).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn hashes_are_salted() {
        let password = "same-password";
        let a = hash_password(password, COST).expect("hash a");
        let b = hash_password(password, COST).expect("hash b");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn async_wrappers_roundtrip() {
        let hash = hash_async("offloaded".into(), COST).await.expect("hash");
        assert!(verify_async("offloaded".into(), hash).await.expect("verify"));
    }
}
