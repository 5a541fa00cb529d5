//! End-to-end range transactions against an in-memory cache entry

use hyper::body::Bytes;
use hyper::header::{HeaderValue, RANGE};
use hyper::HeaderMap;

use rangekeeper::cache::{CacheOp, CacheProbe, MemoryEntry, PartialData, SparseCacheStore};
use rangekeeper::http::ResponseHeaders;

fn range_request(value: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(RANGE, HeaderValue::from_static(value));
    headers
}

fn range_of(headers: &HeaderMap) -> &str {
    headers.get(RANGE).unwrap().to_str().unwrap()
}

async fn ready<T>(op: CacheOp<T>) -> T {
    op.resolve().await.unwrap()
}

#[tokio::test]
async fn test_cached_prefix_then_network_tail() {
    let body: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let mut entry = MemoryEntry::sparse();
    ready(entry.write_sparse(0, Bytes::copy_from_slice(&body[..300]))).await;
    let stored = ResponseHeaders::from_wire(
        b"HTTP/1.1 206 Partial Content\nETag: \"v1\"\nContent-Length: 1000\n\n",
    );

    let mut partial = PartialData::default();
    let request = range_request("bytes=100-599");
    partial.init(&request).unwrap();
    partial.set_headers(&request);
    assert!(partial.update_from_stored_headers(&stored, &entry, false, false));
    assert!(partial.is_requested_range_ok());

    let mut served = Vec::new();
    let mut sub_request = HeaderMap::new();

    // First sub-range comes from the cache.
    assert_eq!(partial.should_validate_cache(&mut entry), Ok(CacheProbe::Ready));
    partial.prepare_cache_validation(&mut sub_request);
    assert!(partial.is_current_range_cached());
    assert!(!partial.is_last_range());
    assert_eq!(partial.current_range_end(), 299);
    assert_eq!(range_of(&sub_request), "bytes=100-299");

    let data = ready(partial.cache_read(&mut entry, 64 * 1024)).await;
    assert_eq!(data.len(), 200);
    served.extend_from_slice(&data);
    partial.on_cache_read_completed(data.len() as i64);

    // The rest is fetched in one network request.
    assert_eq!(partial.should_validate_cache(&mut entry), Ok(CacheProbe::Ready));
    partial.prepare_cache_validation(&mut sub_request);
    assert!(!partial.is_current_range_cached());
    assert!(partial.is_last_range());
    assert_eq!(range_of(&sub_request), "bytes=300-599");

    let network = ResponseHeaders::from_wire(
        b"HTTP/1.1 206 Partial Content\nContent-Range: bytes 300-599/1000\nContent-Length: 300\n\n",
    );
    assert!(partial.response_headers_ok(&network));
    let fetched = Bytes::copy_from_slice(&body[300..600]);
    let written = ready(partial.cache_write(&mut entry, fetched.clone())).await;
    assert_eq!(written, 300);
    served.extend_from_slice(&fetched);
    partial.on_network_read_completed(fetched.len() as i64);

    assert_eq!(partial.should_validate_cache(&mut entry), Ok(CacheProbe::Finished));
    assert_eq!(served, body[100..600]);

    let mut response = stored.clone();
    partial.fix_response_headers(&mut response, true);
    assert_eq!(response.response_code(), 206);
    assert_eq!(
        response.first_value("content-range"),
        Some("bytes 100-599/1000")
    );
    assert_eq!(response.content_length(), Some(500));

    // The entry now holds everything up to byte 599.
    let available = ready(entry.get_available_range(0, 1000)).await;
    assert_eq!((available.start, available.len), (0, 600));
}

#[tokio::test]
async fn test_deferred_store_same_outcome() {
    let mut entry = MemoryEntry::sparse();
    ready(entry.write_sparse(0, Bytes::from(vec![1; 300]))).await;
    entry.set_deferred(true);
    let stored = ResponseHeaders::from_wire(b"HTTP/1.1 206 Partial Content\nContent-Length: 1000\n\n");

    let mut partial = PartialData::default();
    partial.init(&range_request("bytes=100-599")).unwrap();
    assert!(partial.update_from_stored_headers(&stored, &entry, false, false));
    assert!(partial.is_requested_range_ok());

    assert_eq!(partial.should_validate_cache(&mut entry), Ok(CacheProbe::Pending));
    entry.run_pending();
    partial.wait_for_cache_probe().await.unwrap();

    let mut sub_request = HeaderMap::new();
    partial.prepare_cache_validation(&mut sub_request);
    assert!(partial.is_current_range_cached());
    assert_eq!(range_of(&sub_request), "bytes=100-299");

    let op = partial.cache_read(&mut entry, 1024);
    assert!(op.is_pending());
    entry.run_pending();
    assert_eq!(op.resolve().await.unwrap().len(), 200);
}

#[test]
fn test_truncated_entry_probe() {
    let mut entry = MemoryEntry::dense(&[0; 4096]);
    let stored = ResponseHeaders::from_wire(
        b"HTTP/1.1 200 OK\nETag: \"abc\"\nContent-Length: 10000\n\n",
    );

    let mut partial = PartialData::default();
    assert!(partial.init(&HeaderMap::new()).is_err());
    assert!(partial.update_from_stored_headers(&stored, &entry, true, false));
    assert!(partial.initial_validation());
    assert_eq!(partial.current_range_start(), 4096);
    assert!(partial.is_requested_range_ok());

    assert_eq!(partial.should_validate_cache(&mut entry), Ok(CacheProbe::Ready));
    let mut sub_request = HeaderMap::new();
    partial.prepare_cache_validation(&mut sub_request);
    assert!(!partial.is_current_range_cached());
    assert_eq!(range_of(&sub_request), "bytes=4096-4096");

    let network = ResponseHeaders::from_wire(
        b"HTTP/1.1 206 Partial Content\nContent-Range: bytes 4096-4096/10000\nContent-Length: 1\n\n",
    );
    assert!(partial.response_headers_ok(&network));

    // Truncated entries keep the stored headers as they are.
    let mut response = stored.clone();
    partial.fix_response_headers(&mut response, true);
    assert_eq!(response, stored);
}

#[test]
fn test_server_ignoring_probe_restarts_download() {
    let entry = MemoryEntry::dense(&[0; 4096]);
    let stored = ResponseHeaders::from_wire(
        b"HTTP/1.1 200 OK\nETag: \"abc\"\nContent-Length: 10000\n\n",
    );
    let mut partial = PartialData::default();
    assert!(partial.update_from_stored_headers(&stored, &entry, true, false));

    let full = ResponseHeaders::from_wire(b"HTTP/1.1 200 OK\nContent-Length: 10000\n\n");
    assert!(!partial.response_headers_ok(&full));
    partial.set_range_to_start_download();
    assert_eq!(partial.current_range_start(), 0);
    assert!(!partial.initial_validation());
}
