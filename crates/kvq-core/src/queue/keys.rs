//! Persisted key layout. Part of the on-disk compatibility surface.

pub const QUEUE_KEY_PREFIX: &str = "dbq:queue:";
pub const DLX_SUFFIX: &str = ":dlx";

/// `dbq:queue:{name}`: main FIFO list.
pub fn queue_key(name: &str) -> String {
    format!("{QUEUE_KEY_PREFIX}{name}")
}

/// `dbq:queue:{name}:dlx`: dead-letter list.
pub fn dlx_key(name: &str) -> String {
    format!("{QUEUE_KEY_PREFIX}{name}{DLX_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(queue_key("boardwhite:post"), "dbq:queue:boardwhite:post");
        assert_eq!(dlx_key("boardwhite:post"), "dbq:queue:boardwhite:post:dlx");
    }
}
