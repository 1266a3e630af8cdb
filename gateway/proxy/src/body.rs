use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use kanali_gateway_core::BoxError;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ReadError {
    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error(transparent)]
    Read(BoxError),
}

/// Buffers `body`, failing once more than `limit` bytes have been read.
pub(crate) async fn read_limited<B>(body: B, limit: usize) -> Result<Bytes, ReadError>
where
    B: http_body::Body,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(error) if error.is::<LengthLimitError>() => Err(ReadError::TooLarge { limit }),
        Err(error) => Err(ReadError::Read(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Body;

    #[tokio::test]
    async fn reads_up_to_the_limit() {
        let body = read_limited(Body::from("0123456789"), 10).await.unwrap();
        assert_eq!(body, "0123456789");

        let error = read_limited(Body::from("0123456789"), 9).await.unwrap_err();
        assert!(matches!(error, ReadError::TooLarge { limit: 9 }), "{error:?}");
    }
}
