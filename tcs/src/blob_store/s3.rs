//! S3 blob store on the AWS SDK.
//!
//! Objects are written `public-read` with a one-day `Expires` header: they
//! only need to live as long as the device cloud takes to fetch them.
//! Credentials and, unless configured here, the region come from the AWS
//! default chain (environment, shared profile, SSO, instance role).

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::types::ObjectCannedAcl;
use tcs_common::{ArtifactKey, EnvParser, Location};
use tracing::{debug, info};

use super::BlobStore;
use crate::error::{Error, Result};

pub const BUCKET_VAR: &str = "AWS_S3_BUCKET";
pub const DEFAULT_REGION: &str = "us-east-1";
const OBJECT_TTL_SECS: i64 = 24 * 60 * 60;

/// Where artifacts are stored.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    /// Missing bucket is reported on first use, not at construction.
    pub bucket: Option<String>,
    /// Resolved through the AWS chain when absent, then `us-east-1`.
    pub region: Option<String>,
    /// S3-compatible endpoint. Objects are then addressed path-style.
    pub endpoint_url: Option<String>,
    /// Static credentials; the AWS default chain is used when absent.
    pub credentials: Option<Credentials>,
}

impl S3Config {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            region: Some(region.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Read `AWS_S3_BUCKET`, `AWS_REGION` and `AWS_ENDPOINT_URL_S3`.
    ///
    /// Credentials are left to the AWS chain.
    pub fn from_env() -> Self {
        let mut parser = EnvParser::with_prefix("AWS_");
        Self {
            bucket: parser.get_optional_string("S3_BUCKET").into_inner(),
            region: parser.get_optional_string("REGION").into_inner(),
            endpoint_url: parser.get_optional_string("ENDPOINT_URL_S3").into_inner(),
            credentials: None,
        }
    }

    fn bucket(&self) -> Result<&str> {
        self.bucket.as_deref().ok_or_else(|| Error::StoreConfig {
            missing: BUCKET_VAR.to_string(),
        })
    }
}

/// URI-encode each `/`-separated segment of `key`.
fn object_path(key: &ArtifactKey) -> String {
    let encoded: Vec<String> = key
        .as_str()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    encoded.join("/")
}

/// `BlobStore` backed by an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    config: S3Config,
    region: String,
    client: Client,
}

impl S3BlobStore {
    /// Resolve region and credentials, then build the S3 client.
    pub async fn connect(config: S3Config) -> Self {
        let mut loader = aws_config::from_env();
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(credentials) = &config.credentials {
            loader = loader.credentials_provider(credentials.clone());
        }
        let sdk_config = loader.load().await;

        let region = sdk_config
            .region()
            .map_or_else(|| DEFAULT_REGION.to_string(), ToString::to_string);
        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).region(Region::new(region.clone()));
        if let Some(endpoint_url) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url).force_path_style(true);
        }
        debug!(region = %region, endpoint = ?config.endpoint_url, "Built S3 client");

        Self {
            client: Client::from_conf(builder.build()),
            region,
            config,
        }
    }

    pub async fn from_env() -> Self {
        Self::connect(S3Config::from_env()).await
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// Region requests are sent to.
    pub fn region(&self) -> &str {
        &self.region
    }
}

fn expires_at(now: SystemTime) -> DateTime {
    let secs = now
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64);
    DateTime::from_secs(secs + OBJECT_TTL_SECS)
}

fn is_not_found<E>(err: &SdkError<E, HttpResponse>) -> bool {
    err.raw_response()
        .is_some_and(|response| response.status().as_u16() == 404)
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn exists(&self, key: &ArtifactKey) -> Result<bool> {
        let bucket = self.config.bucket()?;
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key.as_str())
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => {
                debug!(key = %key, "Object not found in blob store");
                Ok(false)
            }
            Err(e) => {
                debug!(
                    key = %key,
                    "Blob store probe failed, treating as missing: {}",
                    DisplayErrorContext(&e)
                );
                Ok(false)
            }
        }
    }

    async fn put(&self, key: &ArtifactKey, bytes: Vec<u8>) -> Result<Location> {
        let bucket = self.config.bucket()?;
        let location = self.location_of(key)?;
        let size = bytes.len();

        debug!(key = %key, size, "Uploading {} to {}", key, location);
        self.client
            .put_object()
            .bucket(bucket)
            .key(key.as_str())
            .acl(ObjectCannedAcl::PublicRead)
            .expires(expires_at(SystemTime::now()))
            .content_type("application/octet-stream")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| Error::Upload {
                key: key.clone(),
                cause: DisplayErrorContext(&e).to_string(),
            })?;

        info!(key = %key, size, "Finished uploading {} to {}", key, location);
        Ok(location)
    }

    async fn delete(&self, key: &ArtifactKey) -> Result<()> {
        let bucket = self.config.bucket()?;
        match self
            .client
            .delete_object()
            .bucket(bucket)
            .key(key.as_str())
            .send()
            .await
        {
            Ok(_) => {
                debug!(key = %key, "Deleted {} from blob store", key);
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                debug!(key = %key, "{} was already gone from blob store", key);
                Ok(())
            }
            Err(e) => Err(Error::Delete {
                key: key.clone(),
                cause: DisplayErrorContext(&e).to_string(),
            }),
        }
    }

    fn location_of(&self, key: &ArtifactKey) -> Result<Location> {
        let bucket = self.config.bucket()?;
        let path = object_path(key);
        let url = match &self.config.endpoint_url {
            Some(endpoint) => format!("{}/{bucket}/{path}", endpoint.trim_end_matches('/')),
            None => format!("https://{bucket}.s3.{}.amazonaws.com/{path}", self.region),
        };
        Ok(Location::new(url))
    }
}
