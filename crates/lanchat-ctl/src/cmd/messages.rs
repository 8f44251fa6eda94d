//! Chat and identity commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, post_json, post_json_body};

#[derive(Deserialize)]
struct Ack {
    ok: bool,
}

#[derive(Deserialize)]
struct UsernameResponse {
    username: String,
}

pub async fn cmd_msg(port: u16, to: &str, text: &str) -> Result<()> {
    let body = serde_json::json!({ "to": to, "text": text });
    let resp: Ack = post_json_body(&format!("{}/messages/send", base_url(port)), &body).await?;
    if resp.ok {
        println!("Sent to {}.", to);
    }
    Ok(())
}

pub async fn cmd_name(port: u16, username: &str) -> Result<()> {
    let body = serde_json::json!({ "username": username });
    let resp: UsernameResponse =
        post_json_body(&format!("{}/username", base_url(port)), &body).await?;
    println!("Username is now {:?}.", resp.username);
    Ok(())
}

pub async fn cmd_refresh(port: u16) -> Result<()> {
    let resp: Ack = post_json(&format!("{}/presence/broadcast", base_url(port))).await?;
    if resp.ok {
        println!("Presence broadcast.");
    }
    Ok(())
}
