//! 行エコーサーバーに接続するコンソールクライアントの例
//!
//! 接続後、一定間隔で `Msg[n]` を送り、受信した行を表示する。
//! 指定回数だけ受信したら切断して終了する。
//!
//! 使い方:
//!   cargo run -p echo_server
//!   cargo run -p console_client -- --interval 1 --reads 5

use std::time::Duration;

use http11_exchange::{Action, Tag, TransportEvent};
use tokio_exchange::Transport;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct ClientOptions {
    host: String,
    port: u16,
    interval: u64,
    reads: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = parse_args()?;
    let interval = Duration::from_secs(options.interval);
    let mut transport = Transport::new();

    let events = transport
        .execute(Action::Connect {
            host: options.host.clone(),
            port: options.port,
        })
        .await;
    match events.first() {
        Some(TransportEvent::Connected { address, port }) => {
            println!("DidConnect {} at {}", address, port);
        }
        Some(TransportEvent::ConnectFailed(e)) => {
            return Err(format!("connect failed: {}", e).into());
        }
        other => return Err(format!("unexpected event: {:?}", other).into()),
    }

    // 最初の 1 行は歓迎メッセージ
    let mut read_count = 0;
    while read_count < options.reads {
        if read_count > 0 {
            tokio::time::sleep(interval).await;
            let message = format!("Msg[{}]\r\n", read_count);
            let events = transport
                .execute(Action::Write {
                    data: message.into_bytes(),
                    timeout: Some(interval),
                    tag: Tag::Request,
                })
                .await;
            if !matches!(events.first(), Some(TransportEvent::Written(_))) {
                eprintln!("write failed: {:?}", events);
                break;
            }
        }

        // 行の読み取りにはヘッダー行と同じタグを使う
        let events = transport
            .execute(Action::ReadLine {
                timeout: None,
                tag: Tag::Header,
            })
            .await;
        match events.into_iter().next() {
            Some(TransportEvent::Data { data, .. }) => {
                read_count += 1;
                print!(
                    "DidRead:[{}]{}",
                    read_count,
                    String::from_utf8_lossy(&data)
                );
            }
            Some(TransportEvent::Disconnected(_)) => break,
            other => {
                eprintln!("read failed: {:?}", other);
                break;
            }
        }
    }

    transport.execute(Action::Close).await;
    println!("DidClose");
    Ok(())
}

fn parse_args() -> Result<ClientOptions, Box<dyn std::error::Error>> {
    let mut args = noargs::raw_args();
    args.metadata_mut().app_name = "console_client";

    // --help フラグ
    noargs::HELP_FLAG.take_help(&mut args);

    // --version フラグ
    let version_flag: bool = noargs::flag("version")
        .short('V')
        .doc("Show version")
        .take(&mut args)
        .is_present();
    if version_flag {
        println!("{}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    // --host オプション
    let host: String = noargs::opt("host")
        .doc("Echo server host")
        .default("127.0.0.1")
        .take(&mut args)
        .then(|o| Ok::<_, &str>(o.value().to_string()))
        .map_err(|e| format!("{:?}", e))?;

    // --port オプション
    let port: u16 = noargs::opt("port")
        .short('p')
        .doc("Echo server port")
        .default("15035")
        .take(&mut args)
        .then(|o| o.value().parse())
        .map_err(|e| format!("{:?}", e))?;

    // --interval オプション
    let interval: u64 = noargs::opt("interval")
        .short('i')
        .doc("Seconds between messages")
        .default("5")
        .take(&mut args)
        .then(|o| o.value().parse())
        .map_err(|e| format!("{:?}", e))?;

    // --reads オプション
    let reads: usize = noargs::opt("reads")
        .short('n')
        .doc("Stop after this many lines have been read")
        .default("10")
        .take(&mut args)
        .then(|o| o.value().parse())
        .map_err(|e| format!("{:?}", e))?;

    // 未知の引数があればエラー、ヘルプが返されたら表示
    if let Some(help) = args.finish().map_err(|e| format!("{:?}", e))? {
        print!("{}", help);
        std::process::exit(0);
    }

    Ok(ClientOptions {
        host,
        port,
        interval,
        reads,
    })
}
