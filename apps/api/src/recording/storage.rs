use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

/// Object storage for recorded audio. Returns a URL the transcriber can fetch.
#[async_trait]
pub trait AudioStore: Send + Sync {
    async fn store(&self, user_id: Uuid, audio: Bytes) -> Result<String>;
}

pub struct S3AudioStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3AudioStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url,
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url.trim_end_matches('/'))
    }
}

/// `recordings/{user}/{millis}-{uuid}.webm`; unique even for same-millisecond uploads.
pub fn recording_key(user_id: Uuid) -> String {
    format!(
        "recordings/{user_id}/{}-{}.webm",
        Utc::now().timestamp_millis(),
        Uuid::new_v4()
    )
}

#[async_trait]
impl AudioStore for S3AudioStore {
    async fn store(&self, user_id: Uuid, audio: Bytes) -> Result<String> {
        let key = recording_key(user_id);
        let size = audio.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(audio))
            .content_type("audio/webm")
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 upload failed: {e}"))?;

        info!("Uploaded {size} bytes of audio to s3://{}/{}", self.bucket, key);
        Ok(self.public_url(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_scoped_and_unique() {
        let user = Uuid::new_v4();
        let a = recording_key(user);
        let b = recording_key(user);
        assert!(a.starts_with(&format!("recordings/{user}/")));
        assert!(a.ends_with(".webm"));
        assert_ne!(a, b);
    }
}
