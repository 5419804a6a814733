//! Tar packing of host files for upload into the build container

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use dib_models::CopyOptions;
use tokio::{io::AsyncWriteExt, task::JoinHandle};
use tokio_util::io::ReaderStream;

/// Tar archive streamed to the container runtime
pub type ArchiveStream = ReaderStream<tokio::io::DuplexStream>;

/// Pack `source` into a tar archive with a single top-level entry called `name`. Returns the
/// archive stream along with the packing task, which reports any error reading the source.
pub fn pack(
    source: PathBuf,
    name: OsString,
    options: CopyOptions,
) -> (ArchiveStream, JoinHandle<std::io::Result<()>>) {
    let (tar_writer, tar_reader) = tokio::io::duplex(8192); // 8KB max buffer
    let task = tokio::spawn(async move {
        let mut tar = tokio_tar::Builder::new(tar_writer);
        let metadata = tokio::fs::metadata(&source).await?;
        if metadata.is_dir() {
            tar.append_dir_all(&name, &source).await?;
        } else {
            let mut header = tokio_tar::Header::new_gnu();
            header.set_metadata(&metadata);
            header.set_uid(0);
            header.set_gid(0);
            if let Some(mode) = options.mode {
                header.set_mode(mode);
            }
            if options.crlf_to_lf {
                let content = crlf_to_lf(&tokio::fs::read(&source).await?);
                header.set_size(content.len() as u64);
                tar.append_data(&mut header, &name, content.as_slice())
                    .await?;
            } else {
                let file = tokio::fs::File::open(&source).await?;
                tar.append_data(&mut header, &name, file).await?;
            }
        }
        let mut writer = tar.into_inner().await?;
        writer.shutdown().await
    });

    (ReaderStream::new(tar_reader), task)
}

/// Rewrite every `\r\n` to `\n`. Lone `\r` bytes are kept.
pub fn crlf_to_lf(content: &[u8]) -> Vec<u8> {
    let mut normalized = Vec::with_capacity(content.len());
    let mut bytes = content.iter().peekable();
    while let Some(&byte) = bytes.next() {
        if byte == b'\r' && bytes.peek() == Some(&&b'\n') {
            continue;
        }
        normalized.push(byte);
    }
    normalized
}

/// The name of the top-level archive entry for `source`
pub fn entry_name(source: &Path) -> Option<OsString> {
    source.file_name().map(ToOwned::to_owned)
}
