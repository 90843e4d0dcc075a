//! Remote size probing.
//!
//! HEAD first; servers that block HEAD (405) get a one-byte ranged GET and
//! the total is read from `Content-Range`. Probe failures are not fatal:
//! the size is then learned from the first download response.

use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};

/// Size in bytes of the resource at `url`, or `None` when it cannot be
/// determined without downloading.
pub async fn probe_size(client: &reqwest::Client, url: &str) -> Option<u64> {
    match client.head(url).send().await {
        Ok(resp) if resp.status().is_success() => header_u64(&resp, CONTENT_LENGTH),
        Ok(resp) if resp.status().as_u16() == 405 => range_probe(client, url).await,
        Ok(resp) => {
            tracing::warn!(url, status = resp.status().as_u16(), "size probe rejected");
            None
        }
        Err(e) => {
            tracing::warn!(url, error = %e, "size probe failed");
            None
        }
    }
}

async fn range_probe(client: &reqwest::Client, url: &str) -> Option<u64> {
    let resp = client
        .get(url)
        .header(RANGE, "bytes=0-0")
        .send()
        .await
        .ok()?;
    let header = resp.headers().get(CONTENT_RANGE)?.to_str().ok()?;
    parse_content_range_total(header)
}

fn header_u64(resp: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<u64> {
    resp.headers().get(name)?.to_str().ok()?.parse().ok()
}

/// Total size out of a `Content-Range: bytes X-Y/TOTAL` header.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total_parses() {
        assert_eq!(parse_content_range_total("bytes 0-0/1048576"), Some(1048576));
        assert_eq!(parse_content_range_total("bytes */500"), Some(500));
        assert_eq!(parse_content_range_total("bytes 0-0/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }
}
