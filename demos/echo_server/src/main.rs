//! 行エコーサーバーの例
//!
//! telnet などで接続すると歓迎メッセージが届き、送った行がそのまま返ってくる。
//!
//! 使い方:
//!   cargo run -p echo_server
//!   cargo run -p echo_server -- --port 0
//!
//! ログは RUST_LOG で制御する (デフォルトは info)

use std::time::Duration;

use tokio_exchange::EchoServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct ServerOptions {
    port: u16,
    idle_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "echo_server=info,tokio_exchange=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = parse_args()?;

    let server = EchoServer::bind(&format!("0.0.0.0:{}", options.port))
        .await?
        .idle_timeout(options.idle_timeout.map(Duration::from_secs));
    tracing::info!(addr = %server.local_addr()?, "listening");

    server.serve().await?;
    Ok(())
}

fn parse_args() -> Result<ServerOptions, Box<dyn std::error::Error>> {
    let mut args = noargs::raw_args();
    args.metadata_mut().app_name = "echo_server";

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

    // --port オプション (0 なら空いているポート)
    let port: u16 = noargs::opt("port")
        .short('p')
        .doc("Port to listen on (0 for any)")
        .default("15035")
        .take(&mut args)
        .then(|o| o.value().parse())
        .map_err(|e| format!("{:?}", e))?;

    // --idle-timeout オプション
    let idle_timeout: Option<u64> = noargs::opt("idle-timeout")
        .doc("Close connections idle for this many seconds")
        .take(&mut args)
        .present_and_then(|o| o.value().parse())
        .map_err(|e| format!("{:?}", e))?;

    // 未知の引数があればエラー、ヘルプが返されたら表示
    if let Some(help) = args.finish().map_err(|e| format!("{:?}", e))? {
        print!("{}", help);
        std::process::exit(0);
    }

    Ok(ServerOptions { port, idle_timeout })
}
