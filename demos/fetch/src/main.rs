//! HTTP/HTTPS ダウンロードの例
//!
//! ヘッダーとボディを標準出力に、進捗と所要時間を標準エラー出力に表示する。
//!
//! 使い方:
//!   cargo run -p fetch -- http://example.com/
//!   cargo run -p fetch -- https://deusty.com/index.php --server-name www.deusty.com
//!
//! ログは RUST_LOG で制御する (例: RUST_LOG=tokio_exchange=debug)

use std::io::Write;
use std::time::{Duration, Instant};

use http11_exchange::{ChunkSizeParsing, Exchange, Notification};
use tokio_exchange::{Client, Transport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct FetchOptions {
    url: String,
    server_name: Option<String>,
    timeout: u64,
    lenient: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = parse_args()?;

    let mut client = Client::new()
        .header("User-Agent", concat!("fetch/", env!("CARGO_PKG_VERSION")))
        .header("Accept", "*/*")
        .header_timeout(Some(Duration::from_secs(options.timeout)));
    if options.lenient {
        client = client.chunk_size_parsing(ChunkSizeParsing::Lenient);
    }

    let mut config = client.exchange_config(&options.url)?;
    // 証明書のサーバー名が接続先ホスト名と異なる場合
    if let Some(server_name) = &options.server_name {
        config = config.secure(server_name);
    }

    eprintln!("Connecting to {} ...", config.host());

    let started = Instant::now();
    let mut exchange = Exchange::new(config);
    let mut transport = Transport::new();
    let result = transport
        .run(&mut exchange, &mut |n: Notification| print_notification(n, started))
        .await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn print_notification(notification: Notification, started: Instant) {
    match notification {
        Notification::Connected { address, port } => {
            eprintln!("Connected to {}:{}", address, port);
        }
        Notification::Secured => eprintln!("TLS established"),
        Notification::HeaderReceived(header) => print!("{}", header),
        Notification::Progress { received, total } => {
            let percent = received as f64 / total as f64 * 100.0;
            eprint!("\r{} / {} bytes ({:.1}%)", received, total, percent);
            if received == total {
                eprintln!();
            }
        }
        Notification::BodyFragment(fragment) => {
            if let Err(e) = std::io::stdout().write_all(&fragment) {
                tracing::warn!(error = %e, "failed to write body");
            }
        }
        Notification::TrailerField { name, value } => {
            eprintln!("Trailer: {}: {}", name, value);
        }
        Notification::EncodingError(e) => eprintln!("Warning: {}", e),
        Notification::ExchangeComplete {
            header_bytes,
            body_bytes,
        } => {
            println!();
            eprintln!(
                "Received {} header bytes and {} body bytes in {:.3}s",
                header_bytes,
                body_bytes,
                started.elapsed().as_secs_f64()
            );
        }
        Notification::ExchangeFailed(e) => eprintln!("Failed: {}", e),
        Notification::RequestSent(_) | Notification::Disconnected => {}
    }
}

fn parse_args() -> Result<FetchOptions, Box<dyn std::error::Error>> {
    let mut args = noargs::raw_args();
    args.metadata_mut().app_name = "fetch";

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

    // --server-name オプション (指定すると TLS を使う)
    let server_name: Option<String> = noargs::opt("server-name")
        .doc("Expected TLS server name (implies TLS)")
        .take(&mut args)
        .present_and_then(|o| Ok::<_, &str>(o.value().to_string()))
        .map_err(|e| format!("{:?}", e))?;

    // --timeout オプション
    let timeout: u64 = noargs::opt("timeout")
        .short('t')
        .doc("Header read timeout in seconds")
        .default("10")
        .take(&mut args)
        .then(|o| o.value().parse())
        .map_err(|e| format!("{:?}", e))?;

    // --lenient フラグ
    let lenient: bool = noargs::flag("lenient")
        .doc("Accept malformed chunk size lines")
        .take(&mut args)
        .is_present();

    // 位置引数: URL
    let url: String = noargs::arg("<URL>")
        .doc("URL to fetch (e.g., http://example.com/)")
        .take(&mut args)
        .then(|a| Ok::<_, &str>(a.value().to_string()))
        .map_err(|e| format!("{:?}", e))?;

    // 未知の引数があればエラー、ヘルプが返されたら表示
    if let Some(help) = args.finish().map_err(|e| format!("{:?}", e))? {
        print!("{}", help);
        std::process::exit(0);
    }

    Ok(FetchOptions {
        url,
        server_name,
        timeout,
        lenient,
    })
}
