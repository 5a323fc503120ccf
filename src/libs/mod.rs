pub mod cache;
pub mod csv;
pub mod dser;
pub mod ntp;
pub mod photo;
pub mod scratch;
pub mod time;

use axum::extract::Multipart;
use sha2::{Digest, Sha256};

use crate::Response;
/// Hex SHA-256 of a blob, used to recognise a resubmitted capture.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// 三目运算符，用宏简单实现
#[macro_export]
macro_rules! do_if {
    ($pat:expr => $suc:expr, $e:expr) => {
        if $pat {
            $suc
        } else {
            $e
        }
    };
}

pub struct FilePart {
    pub bytes: Vec<u8>,
}

pub struct MessagePart {
    pub files: Vec<FilePart>,
    pub json: String,
}

impl MessagePart {
    /// The first uploaded file, if any non-empty one was sent.
    pub fn first_file(&self) -> Option<&FilePart> {
        self.files.iter().find(|f| !f.bytes.is_empty())
    }
    /// The `data` field parsed as JSON; a missing field reads as `{}`.
    pub fn data<T: serde::de::DeserializeOwned>(&self) -> Result<T, Response> {
        let json = do_if!(self.json.trim().is_empty() => "{}", self.json.as_str());
        Ok(serde_json::from_str(json)?)
    }
}

pub async fn parse_multipart(mut part: Multipart) -> Result<MessagePart, Response> {
    let mut files = Vec::new();
    let mut data = String::new();
    while let Some(field) = part.next_field().await? {
        match field.name() {
            Some("file") => {
                let bytes = field.bytes().await?.to_vec();
                files.push(FilePart { bytes });
            }
            Some("data") => {
                data = field.text().await?;
            }
            _ => (),
        }
    }
    Ok(MessagePart { files, json: data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_distinguishes_captures() {
        let a = content_hash(b"frame-1");
        assert_eq!(a, content_hash(b"frame-1"));
        assert_ne!(a, content_hash(b"frame-2"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn missing_data_field_reads_as_empty_object() {
        #[derive(serde::Deserialize)]
        struct Data {
            #[serde(default)]
            punch: Option<String>,
        }
        let part = MessagePart {
            files: vec![],
            json: String::new(),
        };
        let data: Data = part.data().unwrap();
        assert!(data.punch.is_none());
    }

    #[test]
    fn first_file_skips_empty_uploads() {
        let part = MessagePart {
            files: vec![
                FilePart { bytes: vec![] },
                FilePart {
                    bytes: vec![1, 2, 3],
                },
            ],
            json: "{}".into(),
        };
        assert_eq!(part.first_file().map(|f| f.bytes.as_slice()), Some(&[1u8, 2, 3][..]));
    }
}
