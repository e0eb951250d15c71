use std::path::Path;

use serde_bencode::value::Value;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

const MAGNET_MARK: &str = "magnet:?";

/// What a dropped file is, judged by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    Torrent,
    Text,
}

impl Descriptor {
    pub fn from_name(name: &str) -> Option<Self> {
        if name.ends_with(".torrent") {
            Some(Descriptor::Torrent)
        } else if name.ends_with(".magnet") || name.ends_with(".txt") {
            Some(Descriptor::Text)
        } else {
            None
        }
    }
}

/// `magnet:?xt=urn:btih:<sha1 of the bencoded info dict>`
pub fn from_torrent_bytes(bytes: &[u8]) -> std::result::Result<String, String> {
    let value = serde_bencode::from_bytes::<Value>(bytes).map_err(|e| e.to_string())?;
    let Value::Dict(mut dict) = value else {
        return Err("torrent is not a dictionary".to_string());
    };
    let info = match dict.remove(b"info".as_slice()) {
        Some(info @ Value::Dict(_)) => info,
        Some(_) => return Err("`info` is not a dictionary".to_string()),
        None => return Err("missing `info`".to_string()),
    };
    let encoded = serde_bencode::to_bytes(&info).map_err(|e| e.to_string())?;
    let digest = Sha1::digest(&encoded);
    Ok(format!("magnet:?xt=urn:btih:{}", hex::encode(digest)))
}

/// Everything from the first `magnet:?` to the end of the trimmed text.
pub fn from_text(text: &str) -> Option<String> {
    let text = text.trim();
    text.find(MAGNET_MARK).map(|i| text[i..].to_string())
}

/// `Ok(None)` for files that are not descriptors or carry no magnet link.
pub async fn extract(path: &Path) -> Result<Option<String>> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let parse_error = |reason: String| Error::Parse {
        path: path.to_path_buf(),
        reason,
    };
    match Descriptor::from_name(name) {
        Some(Descriptor::Torrent) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| parse_error(e.to_string()))?;
            from_torrent_bytes(&bytes).map(Some).map_err(parse_error)
        }
        Some(Descriptor::Text) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| parse_error(e.to_string()))?;
            let text = String::from_utf8(bytes).map_err(|e| parse_error(e.to_string()))?;
            Ok(from_text(&text))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &[u8] = b"d6:lengthi12e4:name8:file.bin12:piece lengthi16384e6:pieces0:e";

    fn torrent(info: &[u8]) -> Vec<u8> {
        let mut bytes = b"d8:announce15:http://tracker/4:info".to_vec();
        bytes.extend_from_slice(info);
        bytes.push(b'e');
        bytes
    }

    #[test]
    fn hash_of_info_dict() {
        let magnet = from_torrent_bytes(&torrent(INFO)).unwrap();
        let expected = hex::encode(Sha1::digest(INFO));
        assert_eq!(magnet, format!("magnet:?xt=urn:btih:{expected}"));
        assert_eq!(magnet.len(), "magnet:?xt=urn:btih:".len() + 40);
        // stable across calls
        assert_eq!(from_torrent_bytes(&torrent(INFO)).unwrap(), magnet);
    }

    #[test]
    fn info_is_reencoded_with_sorted_keys() {
        let unsorted = b"d4:name8:file.bin6:lengthi12e6:pieces0:12:piece lengthi16384ee";
        assert_eq!(
            from_torrent_bytes(&torrent(unsorted)).unwrap(),
            from_torrent_bytes(&torrent(INFO)).unwrap()
        );
    }

    #[test]
    fn broken_torrents() {
        assert!(from_torrent_bytes(b"not bencode").is_err());
        assert!(from_torrent_bytes(b"d8:announce3:urle").is_err());
        assert!(from_torrent_bytes(b"d4:infoi3ee").is_err());
        assert!(from_torrent_bytes(b"li1ee").is_err());
    }

    #[test]
    fn magnet_from_text() {
        let hash = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";
        assert_eq!(
            from_text(&format!("  link: magnet:?xt=urn:btih:{hash}&dn=x \n")),
            Some(format!("magnet:?xt=urn:btih:{hash}&dn=x"))
        );
        assert_eq!(from_text("no link here"), None);
        assert_eq!(from_text("a magnet:?1\nmagnet:?2"), Some("magnet:?1\nmagnet:?2".to_string()));
    }

    #[test]
    fn descriptor_kind() {
        assert_eq!(Descriptor::from_name("a.torrent"), Some(Descriptor::Torrent));
        assert_eq!(Descriptor::from_name("a.magnet"), Some(Descriptor::Text));
        assert_eq!(Descriptor::from_name("a.txt"), Some(Descriptor::Text));
        assert_eq!(Descriptor::from_name("a.mkv"), None);
    }

    #[tokio::test]
    async fn extract_files() {
        let dir = tempfile::tempdir().unwrap();

        let torrent_path = dir.path().join("Show.S01.torrent");
        std::fs::write(&torrent_path, torrent(INFO)).unwrap();
        let magnet = extract(&torrent_path).await.unwrap().unwrap();
        assert!(magnet.starts_with("magnet:?xt=urn:btih:"));

        let text_path = dir.path().join("Show.S01.magnet");
        std::fs::write(&text_path, "magnet:?xt=urn:btih:abc\n").unwrap();
        assert_eq!(
            extract(&text_path).await.unwrap().as_deref(),
            Some("magnet:?xt=urn:btih:abc")
        );

        let empty_path = dir.path().join("empty.txt");
        std::fs::write(&empty_path, "nothing").unwrap();
        assert_eq!(extract(&empty_path).await.unwrap(), None);

        let binary_path = dir.path().join("binary.txt");
        std::fs::write(&binary_path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            extract(&binary_path).await,
            Err(Error::Parse { .. })
        ));

        let broken_path = dir.path().join("broken.torrent");
        std::fs::write(&broken_path, b"garbage").unwrap();
        assert!(matches!(
            extract(&broken_path).await,
            Err(Error::Parse { .. })
        ));

        let other_path = dir.path().join("video.mkv");
        std::fs::write(&other_path, "magnet:?xt=urn:btih:abc").unwrap();
        assert_eq!(extract(&other_path).await.unwrap(), None);
    }
}
