//! Cache-key resolution and on-disk cache layout
//!
//! A conversion artifact is content-addressed by the triple
//! (source path, stream index, source mtime). Changing the source
//! file's mtime changes the key, so stale artifacts are simply never
//! looked up again; no explicit invalidation bookkeeping exists.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Cache artifacts live under this subdirectory of the cache root.
const SUBTITLES_DIR: &str = "subtitles";

/// Milliseconds since the Unix epoch for a modification time.
/// Pre-epoch or unreadable mtimes fold to zero so key derivation is
/// total over every path/index/mtime combination.
pub fn mtime_millis(mtime: SystemTime) -> u128 {
    mtime
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Derive the cache key for (source path, stream index, mtime).
///
/// Deterministic and injective with overwhelming probability: a sha256
/// over the order-preserving concatenation of the inputs. Accepts
/// arbitrary Unicode paths.
pub fn cache_key(source_path: &Path, stream_index: u32, mtime: SystemTime) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.to_string_lossy().as_bytes());
    hasher.update(b"_");
    hasher.update(stream_index.to_string().as_bytes());
    hasher.update(b"_");
    hasher.update(mtime_millis(mtime).to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolve the on-disk cache path for a conversion artifact:
/// `<cache-root>/subtitles/<first-hex-char>/<hash>.<ext>`.
///
/// The first hex character of the key shards artifacts across 16
/// subdirectories, bounding the number of files per directory. Pure
/// function of its inputs; performs no I/O.
pub fn cache_path(
    cache_root: &Path,
    source_path: &Path,
    stream_index: u32,
    mtime: SystemTime,
    extension: &str,
) -> PathBuf {
    let key = cache_key(source_path, stream_index, mtime);
    let shard = &key[..1];
    cache_root
        .join(SUBTITLES_DIR)
        .join(shard)
        .join(format!("{}.{}", key, extension.trim_start_matches('.')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_key_deterministic() {
        let a = cache_key(Path::new("/media/movie.mkv"), 2, t(1_700_000_000));
        let b = cache_key(Path::new("/media/movie.mkv"), 2, t(1_700_000_000));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_key_changes_with_each_input() {
        let base = cache_key(Path::new("movie.mkv"), 2, t(100));
        assert_ne!(base, cache_key(Path::new("movie2.mkv"), 2, t(100)));
        assert_ne!(base, cache_key(Path::new("movie.mkv"), 3, t(100)));
        assert_ne!(base, cache_key(Path::new("movie.mkv"), 2, t(101)));
    }

    #[test]
    fn test_touching_source_invalidates() {
        // movie.mkv at mtime T1 resolves to k1; after a touch to T2 the
        // same (path, index) resolves to a different key.
        let k1 = cache_key(Path::new("movie.mkv"), 2, t(1_000));
        let k2 = cache_key(Path::new("movie.mkv"), 2, t(2_000));
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_pre_epoch_mtime_is_total() {
        let before_epoch = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(mtime_millis(before_epoch), 0);
        let _ = cache_key(Path::new("movie.mkv"), 0, before_epoch);
    }

    #[test]
    fn test_unicode_path() {
        let key = cache_key(Path::new("/médias/видео/映画.mkv"), 1, t(5));
        assert_eq!(key.len(), 64);
    }

    #[test]
    fn test_cache_path_layout() {
        let path = cache_path(
            Path::new("/var/cache"),
            Path::new("movie.mkv"),
            2,
            t(1_000),
            "ass",
        );
        let key = cache_key(Path::new("movie.mkv"), 2, t(1_000));
        let expected = Path::new("/var/cache")
            .join("subtitles")
            .join(&key[..1])
            .join(format!("{}.ass", key));
        assert_eq!(path, expected);
    }

    #[test]
    fn test_cache_path_strips_leading_dot_in_ext() {
        let with_dot = cache_path(Path::new("/c"), Path::new("m.mkv"), 0, t(1), ".srt");
        let without = cache_path(Path::new("/c"), Path::new("m.mkv"), 0, t(1), "srt");
        assert_eq!(with_dot, without);
    }
}
