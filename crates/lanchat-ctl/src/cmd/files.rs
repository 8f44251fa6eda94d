//! File transfer commands.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::http::{base_url, post_json_body};

#[derive(Deserialize)]
struct SendFileResponse {
    filename: String,
    bytes: u64,
    digest: String,
}

#[derive(Deserialize)]
struct RespondResponse {
    accepted: bool,
    save_path: Option<String>,
}

#[derive(Deserialize)]
struct Ack {
    ok: bool,
}

pub async fn cmd_send(port: u16, to: &str, path: &str) -> Result<()> {
    // The daemon opens the file itself, so hand it an absolute path.
    let path = std::fs::canonicalize(Path::new(path))
        .with_context(|| format!("cannot read {}", path))?;
    let body = serde_json::json!({ "to": to, "path": path });
    let resp: SendFileResponse =
        post_json_body(&format!("{}/files/send", base_url(port)), &body).await?;

    println!("Offered {} to {}", resp.filename, to);
    println!("  size   : {} bytes", resp.bytes);
    println!("  md5    : {}", resp.digest);
    println!("Waiting for the peer to accept; follow with `events`.");
    Ok(())
}

pub async fn cmd_respond(
    port: u16,
    from: &str,
    filename: &str,
    accept: bool,
    save_path: Option<&str>,
) -> Result<()> {
    let body = serde_json::json!({
        "from": from,
        "filename": filename,
        "accept": accept,
        "save_path": save_path,
    });
    let resp: RespondResponse =
        post_json_body(&format!("{}/files/respond", base_url(port)), &body).await?;

    match (resp.accepted, resp.save_path) {
        (true, Some(path)) => println!("Accepted {} into {}", filename, path),
        (true, None) => println!("Accepted {}", filename),
        (false, _) => println!("Rejected {}", filename),
    }
    Ok(())
}

pub async fn cmd_cancel(port: u16, filename: &str) -> Result<()> {
    let body = serde_json::json!({ "filename": filename });
    let resp: Ack = post_json_body(&format!("{}/transfers/cancel", base_url(port)), &body).await?;
    if resp.ok {
        println!("Cancel requested for {}.", filename);
    }
    Ok(())
}
