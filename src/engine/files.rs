// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! File transfer on the backend host, one chunk per request.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::errors::{DpfError, Result};
use crate::protocol::{FileRequest, Reply};

fn io_error(action: &str, path: &str, err: std::io::Error) -> DpfError {
    DpfError::io(format!("cannot {action} '{path}': {err}"))
}

/// Write `chunk` at `offset`. Offset 0 starts the file over.
fn upload(path: &str, offset: u64, chunk: &[u8]) -> Result<u64> {
    if offset == 0 {
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error("create directory for", path, e))?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(offset == 0)
        .open(path)
        .map_err(|e| io_error("open", path, e))?;
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.write_all(chunk))
        .map_err(|e| io_error("write", path, e))?;
    Ok(offset + chunk.len() as u64)
}

fn download(path: &str, offset: u64, len: u64) -> Result<(Vec<u8>, bool)> {
    let mut file = fs::File::open(path).map_err(|e| io_error("open", path, e))?;
    let total = file.metadata().map_err(|e| io_error("stat", path, e))?.len();
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(offset.min(total)))
        .map_err(|e| io_error("read", path, e))?;
    file.take(len)
        .read_to_end(&mut bytes)
        .map_err(|e| io_error("read", path, e))?;
    let eof = offset + bytes.len() as u64 >= total;
    Ok((bytes, eof))
}

pub(crate) fn handle(request: FileRequest) -> Result<Reply> {
    match request {
        FileRequest::Upload {
            path,
            offset,
            chunk,
        } => Ok(Reply::Size(upload(&path, offset, &chunk)?)),
        FileRequest::Download { path, offset, len } => {
            let (bytes, eof) = download(&path, offset, len)?;
            Ok(Reply::Chunk { bytes, eof })
        }
        FileRequest::Delete { path } => {
            fs::remove_file(&path).map_err(|e| io_error("delete", &path, e))?;
            Ok(Reply::Unit)
        }
    }
}
