#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use http11_exchange::{
    Action, Exchange, ExchangeConfig, ExchangeState, Limits, Notification, Outcome, Tag,
    TransportEvent,
};

#[derive(Arbitrary, Debug)]
enum Fault {
    None,
    Timeout,
    ReadFailed,
    WrongTag,
}

#[derive(Arbitrary, Debug)]
struct FuzzExchange {
    incoming: Vec<u8>,
    secure: bool,
    fault_at: u8,
    fault: Fault,
}

fuzz_target!(|input: FuzzExchange| {
    let mut config = ExchangeConfig::new("example.com", "/").limits(Limits {
        max_header_size: 4096,
        max_body_size: 1 << 20,
        ..Limits::default()
    });
    if input.secure {
        config = config.secure("example.com");
    }
    let mut exchange = Exchange::new(config);
    exchange.start().unwrap();

    let mut rest = input.incoming.as_slice();
    let mut step = 0u8;
    let mut failed_notified = false;

    while let Some(action) = exchange.poll_action() {
        step = step.wrapping_add(1);
        let faulty = step == input.fault_at;

        let event = match action {
            Action::Connect { port, .. } => TransportEvent::Connected {
                address: "127.0.0.1".to_string(),
                port,
            },
            Action::StartSecure { .. } => TransportEvent::Secured,
            Action::Write { tag, .. } => TransportEvent::Written(tag),
            Action::ReadLine { tag, .. } | Action::ReadExact { tag, .. } if faulty => match input.fault {
                Fault::None => TransportEvent::Disconnected(None),
                Fault::Timeout => TransportEvent::Timeout(tag),
                Fault::ReadFailed => TransportEvent::ReadFailed {
                    error: "fuzz".to_string(),
                    tag,
                },
                Fault::WrongTag => {
                    let wrong = if tag == Tag::Header { Tag::Body } else { Tag::Header };
                    let before = exchange.state();
                    assert!(exchange
                        .handle_event(TransportEvent::Data { data: Vec::new(), tag: wrong })
                        .is_err());
                    assert_eq!(exchange.state(), before);
                    TransportEvent::Disconnected(None)
                }
            },
            Action::ReadLine { tag, .. } => match rest.windows(2).position(|w| w == b"\r\n") {
                Some(i) => {
                    let (line, tail) = rest.split_at(i + 2);
                    rest = tail;
                    TransportEvent::Data { data: line.to_vec(), tag }
                }
                None => TransportEvent::Disconnected(None),
            },
            Action::ReadExact { len, tag, .. } => {
                if rest.len() < len {
                    TransportEvent::Disconnected(None)
                } else {
                    let (block, tail) = rest.split_at(len);
                    rest = tail;
                    TransportEvent::Data { data: block.to_vec(), tag }
                }
            }
            Action::Close => TransportEvent::Disconnected(None),
        };

        exchange.handle_event(event).unwrap();
        while let Some(n) = exchange.poll_notification() {
            if matches!(n, Notification::ExchangeFailed(_)) {
                failed_notified = true;
            }
        }
    }

    // 操作がなくなったら必ず終わっている
    assert_eq!(exchange.state(), ExchangeState::Idle);
    match exchange.outcome() {
        Some(Outcome::Completed) => assert!(!failed_notified),
        Some(Outcome::Failed(_)) => assert!(failed_notified),
        other => panic!("unexpected outcome: {:?}", other),
    }
});
