//! Bounded reads of snapshot request bodies.

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_payload_rejected;
use axum::body::Body;
use axum::http::HeaderMap;
use axum::http::header::CONTENT_LENGTH;
use bytes::{Bytes, BytesMut};
use calsnap_core::config::ServerConfig;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Reads snapshot bodies into memory, rejecting anything over the configured cap.
#[derive(Clone, Debug)]
pub struct PayloadGate {
    max_bytes: usize,
    /// Present when large reads are serialized; one permit.
    permits: Option<Arc<Semaphore>>,
}

impl PayloadGate {
    pub fn new(max_bytes: usize, serialize_reads: bool) -> Self {
        Self {
            max_bytes,
            permits: serialize_reads.then(|| Arc::new(Semaphore::new(1))),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.max_payload_len(),
            config.serialize_large_payload_reads,
        )
    }

    /// Read the whole body. Fails with `PayloadTooLarge` once the cap is
    /// crossed (the body is never truncated) and `BadRequest` when it is empty.
    pub async fn read(&self, headers: &HeaderMap, body: Body) -> ApiResult<Bytes> {
        if let Some(declared) = declared_length(headers)
            && declared > self.max_bytes as u64
        {
            record_payload_rejected("too_large");
            return Err(self.too_large());
        }

        let _permit = match &self.permits {
            Some(permits) => Some(
                permits
                    .acquire()
                    .await
                    .map_err(|e| ApiError::Internal(format!("payload gate closed: {e}")))?,
            ),
            None => None,
        };

        let mut buf = BytesMut::new();
        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                record_payload_rejected("read_error");
                ApiError::BadRequest(format!("failed to read body: {e}"))
            })?;
            if buf.len() + chunk.len() > self.max_bytes {
                record_payload_rejected("too_large");
                return Err(self.too_large());
            }
            buf.extend_from_slice(&chunk);
        }

        if buf.is_empty() {
            record_payload_rejected("empty");
            return Err(ApiError::BadRequest("snapshot payload is empty".to_string()));
        }

        Ok(buf.freeze())
    }

    fn too_large(&self) -> ApiError {
        ApiError::PayloadTooLarge {
            limit: self.max_bytes as u64,
        }
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use futures::channel::mpsc;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn stream_body(chunks: Vec<&'static [u8]>) -> Body {
        let stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c))),
        );
        Body::from_stream(stream)
    }

    /// A body that yields `first` and then waits for more chunks until the
    /// returned sender is dropped.
    fn open_body(
        first: &'static [u8],
    ) -> (mpsc::UnboundedSender<Result<Bytes, std::io::Error>>, Body) {
        let (tx, rx) = mpsc::unbounded();
        tx.unbounded_send(Ok(Bytes::from_static(first))).unwrap();
        (tx, Body::from_stream(rx))
    }

    #[tokio::test]
    async fn reads_body_within_cap() {
        let gate = PayloadGate::new(8, false);
        let bytes = gate
            .read(&HeaderMap::new(), Body::from("abcdefgh"))
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"abcdefgh");
    }

    #[tokio::test]
    async fn rejects_declared_oversize_before_reading() {
        let gate = PayloadGate::new(4, false);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("5"));
        let err = gate.read(&headers, Body::from("abcde")).await.unwrap_err();
        assert!(matches!(err, ApiError::PayloadTooLarge { limit: 4 }));
    }

    #[tokio::test]
    async fn rejects_streamed_oversize() {
        let gate = PayloadGate::new(4, true);
        let body = stream_body(vec![b"ab", b"cd", b"e"]);
        let err = gate.read(&HeaderMap::new(), body).await.unwrap_err();
        assert!(matches!(err, ApiError::PayloadTooLarge { .. }));

        // The permit is released after a rejection.
        let ok = gate
            .read(&HeaderMap::new(), stream_body(vec![b"ab", b"cd"]))
            .await
            .unwrap();
        assert_eq!(ok.len(), 4);
    }

    #[tokio::test]
    async fn rejects_empty_body() {
        let gate = PayloadGate::new(4, false);
        let err = gate
            .read(&HeaderMap::new(), Body::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn serialized_reads_wait_for_the_slot() {
        let gate = PayloadGate::new(64, true);
        let (tx, body) = open_body(b"slow");
        let slow = tokio::spawn({
            let gate = gate.clone();
            async move { gate.read(&HeaderMap::new(), body).await }
        });
        sleep(Duration::from_millis(50)).await;

        let headers = HeaderMap::new();
        let quick = gate.read(&headers, Body::from("quick"));
        tokio::pin!(quick);
        assert!(
            timeout(Duration::from_millis(100), &mut quick).await.is_err(),
            "second read ran while the slot was held"
        );

        tx.unbounded_send(Ok(Bytes::from_static(b"-done"))).unwrap();
        drop(tx);
        assert_eq!(&slow.await.unwrap().unwrap()[..], b"slow-done");

        let bytes = timeout(Duration::from_secs(5), quick).await.unwrap().unwrap();
        assert_eq!(&bytes[..], b"quick");
    }

    #[tokio::test]
    async fn unserialized_reads_run_concurrently() {
        let gate = PayloadGate::new(64, false);
        let (tx, body) = open_body(b"slow");
        let slow = tokio::spawn({
            let gate = gate.clone();
            async move { gate.read(&HeaderMap::new(), body).await }
        });
        sleep(Duration::from_millis(50)).await;

        let bytes = timeout(
            Duration::from_secs(5),
            gate.read(&HeaderMap::new(), Body::from("quick")),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(&bytes[..], b"quick");
        assert!(!slow.is_finished());

        drop(tx);
        assert_eq!(&slow.await.unwrap().unwrap()[..], b"slow");
    }
}
