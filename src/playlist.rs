//! M3U playlist rewriting
//!
//! Turns a playlist of raw upstream URLs into one whose entries point at this
//! relay's `/stream` endpoint. Comment and directive lines (`#EXTINF`, ...)
//! pass through untouched.

use std::path::Path;

use crate::error::Result;

/// Suffix appended to every rewritten entry
pub const FORMAT_SUFFIX: &str = "&format=mpegts";

/// Default playlist read by the server and the rewriter
pub const DEFAULT_INPUT: &str = "playlist_local.m3u";

/// Default output of the rewriter
pub const DEFAULT_OUTPUT: &str = "playlist_local_encoded.m3u";

/// Stream URL prefix for a relay reachable at `host:port`
pub fn stream_prefix(host: &str, port: u16) -> String {
    format!("http://{}:{}/stream?url=", host, port)
}

/// Rewrite every `http://` or `https://` line of `input` into a relay URL
pub fn rewrite(input: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(input.len() * 2);

    for line in input.split_inclusive('\n') {
        let url = line.trim();
        if url.starts_with("http://") || url.starts_with("https://") {
            out.push_str(prefix);
            out.push_str(&urlencoding::encode(url));
            out.push_str(FORMAT_SUFFIX);
            out.push('\n');
        } else {
            out.push_str(line);
        }
    }

    out
}

/// Rewrite the playlist at `input` into `output`
pub async fn rewrite_file(input: &Path, output: &Path, prefix: &str) -> Result<()> {
    let playlist = tokio::fs::read_to_string(input).await?;
    tokio::fs::write(output, rewrite(&playlist, prefix)).await?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        "Playlist rewritten"
    );
    Ok(())
}
