//! lanchat-ctl — command-line interface for the Lanchat daemon.

mod cmd;

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 9101;

fn print_usage() {
    println!("Usage: lanchat-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                           Show node status");
    println!("  peers                            List peers online");
    println!("  transfers                        List active transfers");
    println!("  events [since]                   Show events after sequence number");
    println!("  name <username>                  Change display name");
    println!("  refresh                          Broadcast presence now");
    println!("  msg <ip> <text>                  Send a chat message");
    println!("  send <ip> <path>                 Offer a file to a peer");
    println!("  accept <ip> <filename> [path]    Accept an offered file");
    println!("  reject <ip> <filename>           Reject an offered file");
    println!("  cancel <filename>                Cancel a transfer");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    use cmd::{files, messages, status};

    match remaining.as_slice() {
        ["status"] | [] => status::cmd_status(port).await,
        ["peers"] => status::cmd_peers(port).await,
        ["transfers"] => status::cmd_transfers(port).await,
        ["events"] => status::cmd_events(port, 0).await,
        ["events", since] => {
            let since = since.parse().context("since must be a number")?;
            status::cmd_events(port, since).await
        }
        ["name", username] => messages::cmd_name(port, username).await,
        ["refresh"] => messages::cmd_refresh(port).await,
        ["msg", to, text @ ..] if !text.is_empty() => {
            messages::cmd_msg(port, to, &text.join(" ")).await
        }
        ["send", to, path] => files::cmd_send(port, to, path).await,
        ["accept", from, filename] => files::cmd_respond(port, from, filename, true, None).await,
        ["accept", from, filename, path] => {
            files::cmd_respond(port, from, filename, true, Some(*path)).await
        }
        ["reject", from, filename] => files::cmd_respond(port, from, filename, false, None).await,
        ["cancel", filename] => files::cmd_cancel(port, filename).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
