use std::time::Duration;
use tokio::time::Instant;

/// One pending message: body plus its absolute expiry.
#[derive(Debug, Clone)]
pub struct Entry {
    pub body: String,
    pub expires_at: Instant,
}

impl Entry {
    pub fn new(body: impl Into<String>, ttl: Duration) -> Self {
        Self {
            body: body.into(),
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let entry = Entry::new("code 123456", Duration::from_secs(300));
        let written = entry.expires_at - Duration::from_secs(300);

        assert!(!entry.is_expired_at(written));
        assert!(!entry.is_expired_at(written + Duration::from_secs(299)));
        assert!(entry.is_expired_at(written + Duration::from_secs(300)));
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let entry = Entry::new("gone", Duration::ZERO);
        assert!(entry.is_expired());
    }
}
