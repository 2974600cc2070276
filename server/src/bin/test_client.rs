use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::{ClientEvent, Decoration, ServerEvent, DEFAULT_PORT};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Headless probe: connects, makes a few edits and prints what comes back
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// WebSocket URL of the server
    #[clap(short, long, default_value_t = format!("ws://127.0.0.1:{}", DEFAULT_PORT))]
    url: String,
    /// Number of blocks to place in a row
    #[clap(short, long, default_value_t = 3)]
    blocks: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (ws, _) = connect_async(args.url.as_str()).await?;
    println!("Connected to {}", args.url);
    let (mut sink, mut stream) = ws.split();

    // Compose edits: a row of blocks, a cloud, then remove the first block
    let mut edits = Vec::new();
    for i in 0..args.blocks {
        edits.push(ClientEvent::PlaceBlock {
            key: format!("{},0,0", i),
            x: i as f64,
            y: 0.0,
            z: 0.0,
            color: 0xff0000 + i * 0x20,
        });
    }
    edits.push(ClientEvent::PlaceCloud(Decoration::new(
        "probe-cloud",
        0.0,
        20.0,
        0.0,
    )));
    if args.blocks > 0 {
        edits.push(ClientEvent::RemoveBlock {
            key: "0,0,0".to_string(),
        });
    }

    // Wait for the initial state before sending anything
    loop {
        match next_event(&mut stream).await? {
            Some(ServerEvent::InitialState(state)) => {
                println!("Session {}: {}", state.user_id, state.world.summary());
                break;
            }
            Some(other) => println!("Received {} before initial state", other.name()),
            None => return Err("connection closed before initial state".into()),
        }
    }

    let expected = edits.len();
    for edit in edits {
        println!("Sending {}", edit.name());
        sink.send(Message::Text(edit.to_text()?)).await?;
    }

    // Print broadcasts until all our edits are echoed or the server goes quiet
    let mut echoed = 0;
    while echoed < expected {
        match next_event(&mut stream).await? {
            Some(ServerEvent::UserCount(count)) => println!("Users online: {}", count),
            Some(event) => {
                echoed += 1;
                println!("Broadcast {}: {}", event.name(), event.to_text()?);
            }
            None => break,
        }
    }

    println!("Received {}/{} echoes", echoed, expected);
    sink.close().await?;
    Ok(())
}

async fn next_event<S>(stream: &mut S) -> Result<Option<ServerEvent>, Box<dyn std::error::Error>>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = match timeout(Duration::from_secs(5), stream.next()).await {
            Ok(Some(frame)) => frame?,
            Ok(None) => return Ok(None),
            Err(_) => {
                println!("No message within 5s");
                return Ok(None);
            }
        };
        match frame {
            Message::Text(text) => return Ok(Some(ServerEvent::from_text(&text)?)),
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
}
