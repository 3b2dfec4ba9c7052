use std::path::PathBuf;

use clap::{Args, Subcommand};

use beyond_daemon::http_server::api::client::ApiError;
use beyond_daemon::http_server::api::v0::fs::{
    AppendRequest, CreateRequest, DeleteRequest, MkdirRequest, ReadRequest, ReaddirRequest,
    StatRequest, TruncateRequest, WriteRequest,
};
use common::object::ObjectKind;

use crate::cli::op::{Op, OpContext};

/// File operations through a running mount
#[derive(Args, Debug, Clone)]
pub struct Fs {
    #[command(subcommand)]
    pub command: FsCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum FsCommand {
    /// List a directory
    Ls(ReaddirRequest),
    /// Print a file
    Cat(ReadRequest),
    /// Create an empty file
    Touch(CreateRequest),
    /// Create a directory
    Mkdir(MkdirRequest),
    /// Remove a file or directory
    Rm(DeleteRequest),
    /// Show an object's metadata
    Stat(StatRequest),
    /// Cut or zero-extend a file
    Truncate(TruncateRequest),
    /// Write bytes at an offset
    Write(Write),
    /// Add bytes at the end of a file
    Append(Append),
}

/// Bytes given inline or read from a local file
#[derive(Args, Debug, Clone)]
pub struct Payload {
    /// Literal text to write
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,

    /// Local file whose contents to write
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl Payload {
    fn bytes(&self) -> Result<Vec<u8>, FsError> {
        match (&self.data, &self.file) {
            (Some(data), _) => Ok(data.as_bytes().to_vec()),
            (None, Some(file)) => Ok(std::fs::read(file)?),
            (None, None) => Err(FsError::NoPayload),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct Write {
    pub path: String,

    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    #[command(flatten)]
    pub payload: Payload,
}

#[derive(Args, Debug, Clone)]
pub struct Append {
    pub path: String,

    #[command(flatten)]
    pub payload: Payload,
}

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("could not read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("either --data or --file must be provided")]
    NoPayload,
}

#[async_trait::async_trait]
impl Op for Fs {
    type Error = FsError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let client = &ctx.client;
        match &self.command {
            FsCommand::Ls(req) => {
                let response = client.call(req.clone()).await?;
                Ok(response
                    .entries
                    .iter()
                    .map(|entry| match entry.kind {
                        ObjectKind::Directory => format!("{}/", entry.name),
                        ObjectKind::File => entry.name.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            FsCommand::Cat(req) => {
                let response = client.call(req.clone()).await?;
                // binary content is shown as hex
                Ok(match String::from_utf8(response.data) {
                    Ok(text) => text,
                    Err(e) => e
                        .as_bytes()
                        .iter()
                        .map(|b| format!("{:02x}", b))
                        .collect::<Vec<_>>()
                        .join(" "),
                })
            }
            FsCommand::Touch(req) => {
                let response = client.call(req.clone()).await?;
                Ok(format!("created {} ({})", req.path, response.id.to_hex()))
            }
            FsCommand::Mkdir(req) => {
                let response = client.call(req.clone()).await?;
                Ok(format!("created {}/ ({})", req.path, response.id.to_hex()))
            }
            FsCommand::Rm(req) => {
                let response = client.call(req.clone()).await?;
                Ok(format!("removed {}", response.path))
            }
            FsCommand::Stat(req) => {
                let stat = client.call(req.clone()).await?;
                Ok(format!(
                    "id:       {}\nkind:     {}\nsize:     {}\nversion:  {}\nmodified: {}\nowners:   {}\nmask:     {:#b}",
                    stat.id.to_hex(),
                    stat.kind,
                    stat.size,
                    stat.version,
                    format_modified(stat.modified),
                    stat.owners,
                    stat.mask,
                ))
            }
            FsCommand::Truncate(req) => {
                let outcome = client.call(req.clone()).await?;
                Ok(format!(
                    "{} is now {} bytes (dropped {} chunks, padded {})",
                    req.path, req.len, outcome.dropped, outcome.padded
                ))
            }
            FsCommand::Write(op) => {
                let request = WriteRequest {
                    path: op.path.clone(),
                    offset: op.offset,
                    data: op.payload.bytes()?,
                };
                let response = client.call(request).await?;
                Ok(format!("wrote {} bytes to {}", response.written, op.path))
            }
            FsCommand::Append(op) => {
                let request = AppendRequest {
                    path: op.path.clone(),
                    data: op.payload.bytes()?,
                };
                let response = client.call(request).await?;
                Ok(format!("{} is now {} bytes", op.path, response.len))
            }
        }
    }
}

fn format_modified(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
