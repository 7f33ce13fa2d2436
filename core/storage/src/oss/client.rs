//! HTTP client for the Alibaba Cloud OSS REST API.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, Client, Method, Response};
use ring::hmac;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, instrument};
use url::Url;
use zeroize::Zeroize;

use ossnav_common::{Error, Result};

use super::api::{
    BucketHandle, BucketPage, BucketSummary, ListObjectsQuery, ObjectHead, ObjectListing,
    ObjectSummary, OssApi,
};
use super::error::{OssError, OssResult};

const USER_AGENT: &str = concat!("ossnav/", env!("CARGO_PKG_VERSION"));

/// Characters left unescaped in object keys placed in a URL path.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// How bucket names are placed into request URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Addressing {
    /// `https://bucket.endpoint/key`, what OSS itself expects.
    #[default]
    VirtualHosted,
    /// `https://endpoint/bucket/key`, for compatible services and tests.
    Path,
}

/// Connection settings for an OSS account.
#[derive(Clone)]
pub struct OssConfig {
    /// Default endpoint, with or without a scheme.
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub addressing: Addressing,
    /// Route each bucket to the endpoint of its own region.
    pub regional_endpoints: bool,
}

impl OssConfig {
    pub fn new(
        endpoint: impl Into<String>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            addressing: Addressing::default(),
            regional_endpoints: true,
        }
    }

    /// Address buckets by path and keep every bucket on the default endpoint.
    pub fn path_style(mut self) -> Self {
        self.addressing = Addressing::Path;
        self.regional_endpoints = false;
        self
    }
}

impl fmt::Debug for OssConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OssConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"[REDACTED]")
            .field("addressing", &self.addressing)
            .field("regional_endpoints", &self.regional_endpoints)
            .finish()
    }
}

impl Drop for OssConfig {
    fn drop(&mut self) {
        self.access_key_secret.zeroize();
    }
}

/// Prefix `https://` onto an endpoint that carries no scheme.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}

/// Endpoint serving the region `location`.
pub fn regional_endpoint(location: &str) -> String {
    format!("https://{}.aliyuncs.com", location)
}

/// Build the string signed for an OSS request.
///
/// `oss_headers` are the `x-oss-*` headers of the request; `resource` is
/// the canonical resource (`/bucket/key` plus any sub-resource).
pub fn string_to_sign(
    method: &Method,
    content_md5: &str,
    content_type: &str,
    date: &str,
    oss_headers: &[(String, String)],
    resource: &str,
) -> String {
    let mut headers: Vec<(String, &str)> = oss_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
        .collect();
    headers.sort();

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    format!(
        "{}\n{}\n{}\n{}\n{}{}",
        method, content_md5, content_type, date, canonical_headers, resource
    )
}

/// `Authorization` header value for a string to sign.
pub fn authorization(access_key_id: &str, access_key_secret: &str, string_to_sign: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, access_key_secret.as_bytes());
    let signature = hmac::sign(&key, string_to_sign.as_bytes());
    format!(
        "OSS {}:{}",
        access_key_id,
        STANDARD.encode(signature.as_ref())
    )
}

fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

/// A single request before signing.
struct OssRequest<'a> {
    method: Method,
    endpoint: &'a str,
    bucket: Option<&'a str>,
    key: Option<&'a str>,
    sub_resource: Option<&'static str>,
    query: Vec<(&'static str, String)>,
    oss_headers: Vec<(String, String)>,
    content_type: Option<String>,
    body: Option<Vec<u8>>,
}

impl<'a> OssRequest<'a> {
    fn new(method: Method, endpoint: &'a str) -> Self {
        Self {
            method,
            endpoint,
            bucket: None,
            key: None,
            sub_resource: None,
            query: Vec::new(),
            oss_headers: Vec::new(),
            content_type: None,
            body: None,
        }
    }

    fn bucket(mut self, bucket: &'a str) -> Self {
        self.bucket = Some(bucket);
        self
    }

    fn key(mut self, key: &'a str) -> Self {
        self.key = Some(key);
        self
    }

    fn canonical_resource(&self) -> String {
        let mut resource = match (self.bucket, self.key) {
            (Some(bucket), Some(key)) => format!("/{}/{}", bucket, key),
            (Some(bucket), None) => format!("/{}/", bucket),
            _ => "/".to_string(),
        };
        if let Some(sub) = self.sub_resource {
            resource.push('?');
            resource.push_str(sub);
        }
        resource
    }
}

/// OSS REST API client.
pub struct OssClient {
    http: Client,
    config: OssConfig,
    endpoint: String,
}

impl OssClient {
    /// Create a client for the account in `config`.
    ///
    /// # Errors
    /// - `Configuration` if the endpoint is not a valid URL
    pub fn new(config: OssConfig) -> Result<Self> {
        let endpoint = normalize_endpoint(&config.endpoint);
        Url::parse(&endpoint).map_err(|e| {
            Error::Configuration(format!("Invalid endpoint '{}': {}", endpoint, e))
        })?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            endpoint,
        })
    }

    /// Normalised default endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, request: &OssRequest<'_>) -> OssResult<Url> {
        let mut url = Url::parse(request.endpoint)
            .map_err(|e| OssError::Malformed(format!("Invalid endpoint '{}': {}", request.endpoint, e)))?;
        let key = request.key.map(encode_key).unwrap_or_default();

        match (request.bucket, self.config.addressing) {
            (None, _) => url.set_path("/"),
            (Some(bucket), Addressing::VirtualHosted) => {
                let host = url
                    .host_str()
                    .ok_or_else(|| OssError::Malformed(format!("Endpoint has no host: {}", url)))?;
                let virtual_host = format!("{}.{}", bucket, host);
                url.set_host(Some(&virtual_host))
                    .map_err(|e| OssError::Malformed(format!("Invalid bucket host: {}", e)))?;
                url.set_path(&format!("/{}", key));
            }
            (Some(bucket), Addressing::Path) => url.set_path(&format!("/{}/{}", bucket, key)),
        }

        if let Some(sub) = request.sub_resource {
            url.set_query(Some(sub));
        } else if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &request.query {
                pairs.append_pair(name, value);
            }
        }

        Ok(url)
    }

    async fn execute(&self, request: OssRequest<'_>) -> OssResult<Response> {
        let url = self.url(&request)?;
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let content_type = request.content_type.clone().unwrap_or_default();

        let to_sign = string_to_sign(
            &request.method,
            "",
            &content_type,
            &date,
            &request.oss_headers,
            &request.canonical_resource(),
        );
        let auth = authorization(
            &self.config.access_key_id,
            &self.config.access_key_secret,
            &to_sign,
        );

        debug!(method = %request.method, url = %url, "sending OSS request");

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(header::DATE, date)
            .header(header::AUTHORIZATION, auth);
        if !content_type.is_empty() {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        for (name, value) in &request.oss_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(service_error(
            status.as_u16(),
            &text,
            request.bucket,
            request.key,
        ))
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> OssResult<T> {
        let text = response.text().await?;
        quick_xml::de::from_str(&text).map_err(|e| OssError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl OssApi for OssClient {
    #[instrument(skip(self))]
    async fn list_buckets(&self, marker: Option<&str>, max_keys: usize) -> OssResult<BucketPage> {
        let mut request = OssRequest::new(Method::GET, &self.endpoint);
        request.query.push(("max-keys", max_keys.to_string()));
        if let Some(marker) = marker {
            request.query.push(("marker", marker.to_string()));
        }

        let response = self.execute(request).await?;
        let result: ListAllMyBucketsResult = Self::decode(response).await?;

        Ok(BucketPage {
            buckets: result
                .buckets
                .bucket
                .into_iter()
                .map(|b| BucketSummary {
                    name: b.name,
                    creation_date: b.creation_date.as_deref().and_then(parse_iso8601),
                    location: non_empty(b.location),
                })
                .collect(),
            is_truncated: result.is_truncated.unwrap_or(false),
            next_marker: non_empty(result.next_marker),
        })
    }

    #[instrument(skip(self))]
    async fn bucket_location(&self, bucket: &str) -> OssResult<String> {
        let mut request = OssRequest::new(Method::GET, &self.endpoint).bucket(bucket);
        request.sub_resource = Some("bucketInfo");

        let response = self.execute(request).await?;
        let info: BucketInfoResult = Self::decode(response).await?;
        Ok(info.bucket.location)
    }

    #[instrument(skip(self, bucket), fields(bucket = %bucket.name))]
    async fn list_objects(
        &self,
        bucket: &BucketHandle,
        query: &ListObjectsQuery,
    ) -> OssResult<ObjectListing> {
        let mut request = OssRequest::new(Method::GET, &bucket.endpoint).bucket(&bucket.name);
        request.query.push(("prefix", query.prefix.clone()));
        if !query.delimiter.is_empty() {
            request.query.push(("delimiter", query.delimiter.clone()));
        }
        if let Some(marker) = &query.marker {
            request.query.push(("marker", marker.clone()));
        }
        request.query.push(("max-keys", query.max_keys.to_string()));

        let response = self.execute(request).await?;
        let result: ListBucketResult = Self::decode(response).await?;

        Ok(ObjectListing {
            objects: result
                .contents
                .into_iter()
                .map(|c| ObjectSummary {
                    key: c.key,
                    size: c.size,
                    last_modified: c.last_modified.as_deref().and_then(parse_iso8601),
                    etag: c.etag,
                })
                .collect(),
            common_prefixes: result.common_prefixes.into_iter().map(|p| p.prefix).collect(),
            is_truncated: result.is_truncated,
            next_marker: non_empty(result.next_marker),
        })
    }

    #[instrument(skip(self, bucket), fields(bucket = %bucket.name))]
    async fn get_object(&self, bucket: &BucketHandle, key: &str) -> OssResult<Vec<u8>> {
        let request = OssRequest::new(Method::GET, &bucket.endpoint)
            .bucket(&bucket.name)
            .key(key);
        let response = self.execute(request).await?;
        Ok(response.bytes().await?.to_vec())
    }

    #[instrument(skip(self, bucket, data), fields(bucket = %bucket.name, size = data.len()))]
    async fn put_object(&self, bucket: &BucketHandle, key: &str, data: Vec<u8>) -> OssResult<()> {
        let mut request = OssRequest::new(Method::PUT, &bucket.endpoint)
            .bucket(&bucket.name)
            .key(key);
        request.content_type = Some(
            mime_guess::from_path(key)
                .first_or_octet_stream()
                .to_string(),
        );
        request.body = Some(data);

        self.execute(request).await?;
        Ok(())
    }

    #[instrument(skip(self, bucket), fields(bucket = %bucket.name))]
    async fn head_object(&self, bucket: &BucketHandle, key: &str) -> OssResult<ObjectHead> {
        let request = OssRequest::new(Method::HEAD, &bucket.endpoint)
            .bucket(&bucket.name)
            .key(key);
        let response = self.execute(request).await?;
        let headers = response.headers();

        let header_str = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Ok(ObjectHead {
            content_length: header_str(header::CONTENT_LENGTH)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            last_modified: header_str(header::LAST_MODIFIED)
                .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
                .map(|d| d.with_timezone(&Utc)),
            etag: header_str(header::ETAG),
            content_type: header_str(header::CONTENT_TYPE),
        })
    }

    #[instrument(skip(self, bucket), fields(bucket = %bucket.name))]
    async fn delete_object(&self, bucket: &BucketHandle, key: &str) -> OssResult<()> {
        let request = OssRequest::new(Method::DELETE, &bucket.endpoint)
            .bucket(&bucket.name)
            .key(key);
        self.execute(request).await?;
        Ok(())
    }

    #[instrument(skip(self, bucket), fields(bucket = %bucket.name))]
    async fn copy_object(
        &self,
        bucket: &BucketHandle,
        src_bucket: &str,
        src_key: &str,
        dst_key: &str,
    ) -> OssResult<()> {
        let mut request = OssRequest::new(Method::PUT, &bucket.endpoint)
            .bucket(&bucket.name)
            .key(dst_key);
        request.oss_headers.push((
            "x-oss-copy-source".to_string(),
            format!("/{}/{}", src_bucket, encode_key(src_key)),
        ));

        self.execute(request).await?;
        Ok(())
    }
}

/// Decode an error response, falling back on the status for empty bodies.
fn service_error(status: u16, body: &str, bucket: Option<&str>, key: Option<&str>) -> OssError {
    let parsed: Option<ErrorDocument> = if body.trim().is_empty() {
        None
    } else {
        quick_xml::de::from_str(body).ok()
    };

    let (code, message, request_id, doc_bucket, doc_key) = match parsed {
        Some(doc) => (doc.code, doc.message, doc.request_id, doc.bucket_name, doc.key),
        None => {
            let code = match status {
                404 if key.is_some() => "NoSuchKey".to_string(),
                404 => "NoSuchBucket".to_string(),
                403 => "AccessDenied".to_string(),
                _ => format!("HTTP{}", status),
            };
            (code, format!("HTTP status {}", status), None, None, None)
        }
    };

    OssError::Service {
        status,
        code,
        message,
        request_id,
        bucket: doc_bucket.or_else(|| bucket.map(str::to_string)),
        key: doc_key.or_else(|| key.map(str::to_string)),
    }
}

fn parse_iso8601(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ==================== Response documents ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListAllMyBucketsResult {
    #[serde(default)]
    is_truncated: Option<bool>,
    #[serde(default)]
    next_marker: Option<String>,
    #[serde(default)]
    buckets: BucketList,
}

#[derive(Debug, Default, Deserialize)]
struct BucketList {
    #[serde(rename = "Bucket", default)]
    bucket: Vec<BucketEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketEntry {
    name: String,
    #[serde(default)]
    creation_date: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketInfoResult {
    bucket: BucketInfoEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketInfoEntry {
    location: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_marker: Option<String>,
    #[serde(default)]
    contents: Vec<ContentsEntry>,
    #[serde(default)]
    common_prefixes: Vec<CommonPrefix>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContentsEntry {
    key: String,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(rename = "ETag", default)]
    etag: Option<String>,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommonPrefix {
    prefix: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorDocument {
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    bucket_name: Option<String>,
    #[serde(default)]
    key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OssClient {
        OssClient::new(OssConfig::new(server.uri(), "test-id", "test-secret").path_style()).unwrap()
    }

    fn handle(server: &MockServer, name: &str) -> BucketHandle {
        BucketHandle::new(name, server.uri())
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("oss-cn-hangzhou.aliyuncs.com"),
            "https://oss-cn-hangzhou.aliyuncs.com"
        );
        assert_eq!(normalize_endpoint("http://localhost:9000/"), "http://localhost:9000");
        assert_eq!(
            regional_endpoint("oss-cn-shanghai"),
            "https://oss-cn-shanghai.aliyuncs.com"
        );
    }

    #[test]
    fn test_string_to_sign_layout() {
        let headers = vec![
            ("X-OSS-Meta-Author".to_string(), "foo ".to_string()),
            ("x-oss-copy-source".to_string(), "/src/a.txt".to_string()),
        ];
        let s = string_to_sign(
            &Method::PUT,
            "",
            "text/plain",
            "Thu, 17 Nov 2005 18:49:58 GMT",
            &headers,
            "/bucket/key",
        );
        assert_eq!(
            s,
            "PUT\n\ntext/plain\nThu, 17 Nov 2005 18:49:58 GMT\n\
             x-oss-copy-source:/src/a.txt\nx-oss-meta-author:foo\n/bucket/key"
        );
    }

    #[test]
    fn test_authorization_header() {
        let a = authorization("id", "secret", "GET\n\n\ndate\n/");
        let b = authorization("id", "other-secret", "GET\n\n\ndate\n/");
        assert!(a.starts_with("OSS id:"));
        // HMAC-SHA1 is 20 bytes, 28 characters of base64.
        assert_eq!(a.len(), "OSS id:".len() + 28);
        assert_ne!(a, b);
    }

    #[test]
    fn test_encode_key_keeps_slashes() {
        assert_eq!(encode_key("dir/a b+c.txt"), "dir/a%20b%2Bc.txt");
        assert_eq!(encode_key("日本/x"), "%E6%97%A5%E6%9C%AC/x");
    }

    #[test]
    fn test_virtual_hosted_url() {
        let client = OssClient::new(OssConfig::new("oss-cn-hangzhou.aliyuncs.com", "id", "secret"))
            .unwrap();
        let request = OssRequest::new(Method::GET, client.endpoint())
            .bucket("photos")
            .key("2024/a b.jpg");
        let url = client.url(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "https://photos.oss-cn-hangzhou.aliyuncs.com/2024/a%20b.jpg"
        );
        assert_eq!(request.canonical_resource(), "/photos/2024/a b.jpg");
    }

    #[test]
    fn test_config_debug_redacts_secret() {
        let config = OssConfig::new("endpoint", "id", "super-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
    }

    #[tokio::test]
    async fn test_list_buckets_decodes_xml() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header_exists("authorization"))
            .and(header_exists("date"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<ListAllMyBucketsResult>
  <Owner><ID>512</ID><DisplayName>512</DisplayName></Owner>
  <Buckets>
    <Bucket>
      <CreationDate>2014-02-17T18:12:43.000Z</CreationDate>
      <ExtranetEndpoint>oss-cn-shanghai.aliyuncs.com</ExtranetEndpoint>
      <Location>oss-cn-shanghai</Location>
      <Name>app-base-oss</Name>
    </Bucket>
    <Bucket>
      <CreationDate>2014-02-25T11:21:04.000Z</CreationDate>
      <Location>oss-cn-hangzhou</Location>
      <Name>mybucket</Name>
    </Bucket>
  </Buckets>
</ListAllMyBucketsResult>"#,
            ))
            .mount(&server)
            .await;

        let page = client(&server).list_buckets(None, 100).await.unwrap();
        assert_eq!(page.buckets.len(), 2);
        assert_eq!(page.buckets[0].name, "app-base-oss");
        assert_eq!(page.buckets[0].location.as_deref(), Some("oss-cn-shanghai"));
        assert!(page.buckets[1].creation_date.is_some());
        assert!(!page.is_truncated);
    }

    #[tokio::test]
    async fn test_bucket_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/"))
            .and(query_param("bucketInfo", ""))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<BucketInfo><Bucket><Location>oss-cn-beijing</Location><Name>photos</Name></Bucket></BucketInfo>"#,
            ))
            .mount(&server)
            .await;

        let location = client(&server).bucket_location("photos").await.unwrap();
        assert_eq!(location, "oss-cn-beijing");
    }

    #[tokio::test]
    async fn test_list_objects_query_and_decoding() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/"))
            .and(query_param("prefix", "2024/"))
            .and(query_param("delimiter", "/"))
            .and(query_param("marker", "2024/a.jpg"))
            .and(query_param("max-keys", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <Name>photos</Name>
  <Prefix>2024/</Prefix>
  <Marker>2024/a.jpg</Marker>
  <MaxKeys>2</MaxKeys>
  <Delimiter>/</Delimiter>
  <IsTruncated>true</IsTruncated>
  <NextMarker>2024/b.jpg</NextMarker>
  <Contents>
    <Key>2024/b.jpg</Key>
    <LastModified>2024-01-05T08:42:32.000Z</LastModified>
    <ETag>"5B3C1A2E053D763E1B002CC607C5A0FE"</ETag>
    <Type>Normal</Type>
    <Size>344606</Size>
    <StorageClass>Standard</StorageClass>
  </Contents>
  <CommonPrefixes>
    <Prefix>2024/albums/</Prefix>
  </CommonPrefixes>
</ListBucketResult>"#,
            ))
            .mount(&server)
            .await;

        let query = ListObjectsQuery {
            prefix: "2024/".to_string(),
            delimiter: "/".to_string(),
            marker: Some("2024/a.jpg".to_string()),
            max_keys: 2,
        };
        let listing = client(&server)
            .list_objects(&handle(&server, "photos"), &query)
            .await
            .unwrap();

        assert!(listing.is_truncated);
        assert_eq!(listing.next_marker.as_deref(), Some("2024/b.jpg"));
        assert_eq!(listing.objects.len(), 1);
        assert_eq!(listing.objects[0].size, 344606);
        assert_eq!(
            listing.objects[0].etag.as_deref(),
            Some("\"5B3C1A2E053D763E1B002CC607C5A0FE\"")
        );
        assert_eq!(listing.common_prefixes, ["2024/albums/"]);
    }

    #[tokio::test]
    async fn test_put_object_guesses_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/docs/notes/readme.txt"))
            .and(header("content-type", "text/plain"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .put_object(&handle(&server, "docs"), "notes/readme.txt", b"hi".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_copy_object_sends_source_header() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/dst/copy.txt"))
            .and(header("x-oss-copy-source", "/src/orig%20name.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<CopyObjectResult><ETag>\"abc\"</ETag></CopyObjectResult>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .copy_object(&handle(&server, "dst"), "src", "orig name.txt", "copy.txt")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_head_object_reads_headers() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/docs/a.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("etag", "\"abc\"")
                    .insert_header("last-modified", "Fri, 05 Jan 2024 06:07:48 GMT")
                    .insert_header("content-type", "text/plain"),
            )
            .mount(&server)
            .await;

        let head = client(&server)
            .head_object(&handle(&server, "docs"), "a.txt")
            .await
            .unwrap();
        assert_eq!(head.etag.as_deref(), Some("\"abc\""));
        assert_eq!(head.content_type.as_deref(), Some("text/plain"));
        assert!(head.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_error_document_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/missing.txt"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
  <Code>NoSuchKey</Code>
  <Message>The specified key does not exist.</Message>
  <RequestId>5C3D9175B6FC201293AD****</RequestId>
  <HostId>docs.oss-cn-hangzhou.aliyuncs.com</HostId>
  <Key>missing.txt</Key>
</Error>"#,
            ))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_object(&handle(&server, "docs"), "missing.txt")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("NoSuchKey"));
        match err {
            OssError::Service { request_id, key, .. } => {
                assert_eq!(request_id.as_deref(), Some("5C3D9175B6FC201293AD****"));
                assert_eq!(key.as_deref(), Some("missing.txt"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_error_body_falls_back_on_status() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/docs/gone.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let c = client(&server);
        let err = c.head_object(&handle(&server, "docs"), "gone.txt").await.unwrap_err();
        assert_eq!(err.code(), Some("NoSuchKey"));

        let err: Error = c.list_buckets(None, 10).await.unwrap_err().into();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }
}
