use std::time::Duration;

use sweep_core::{DeviceRole, SweepError};
use sweep_link::{await_result, ProtocolState, ProtocolTiming};
use sweep_store::SerialRecord;
use tokio::sync::mpsc;
use tokio::time::sleep;

fn timing() -> ProtocolTiming {
    ProtocolTiming {
        watchdog: Duration::from_secs(10),
        quiescence: Duration::from_secs(5),
    }
}

#[derive(Default)]
struct Collected(Vec<(DeviceRole, SerialRecord)>);

impl sweep_link::RecordSink for Collected {
    fn accept(&mut self, role: DeviceRole, record: &SerialRecord) {
        self.0.push((role, record.clone()));
    }
}

#[tokio::test(start_paused = true)]
async fn resolves_with_terminal_record_after_quiescence() {
    let (rx_tx, rx_rx) = mpsc::channel(16);
    let (tx_tx, tx_rx) = mpsc::channel(16);
    tokio::spawn(async move {
        tx_tx.send(r#"{"tx":{"seq":1}}"#.to_string()).await.ok();
        rx_tx.send(r#"{"rx":{"seq":1,"rssi":-60}}"#.to_string()).await.ok();
        sleep(Duration::from_secs(1)).await;
        tx_tx
            .send(r#"{"result":{"sent":1,"failed":0}}"#.to_string())
            .await
            .ok();
        // A late receive event still reaches the sink while quiescing.
        sleep(Duration::from_secs(2)).await;
        rx_tx.send(r#"{"rx":{"seq":2,"rssi":-62}}"#.to_string()).await.ok();
        sleep(Duration::from_secs(30)).await;
    });

    let mut sink = Collected::default();
    let started = tokio::time::Instant::now();
    let outcome = await_result(rx_rx, tx_rx, &timing(), &mut sink)
        .await
        .expect("resolves");

    assert_eq!(outcome.state, ProtocolState::Resolved);
    assert!(outcome.terminal.is_terminal());
    assert_eq!(outcome.accepted, 4);
    assert_eq!(outcome.discarded, 0);
    assert_eq!(started.elapsed(), Duration::from_secs(6));
    let receiving = sink
        .0
        .iter()
        .filter(|(role, _)| *role == DeviceRole::Receiving)
        .count();
    assert_eq!(receiving, 2);
}

#[tokio::test(start_paused = true)]
async fn watchdog_expires_without_sending_records() {
    let (rx_tx, rx_rx) = mpsc::channel(16);
    let (_tx_tx, tx_rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        // Receive events alone never rearm the watchdog.
        for seq in 0..20 {
            rx_tx
                .send(format!(r#"{{"rx":{{"seq":{seq},"rssi":-50}}}}"#))
                .await
                .ok();
            sleep(Duration::from_secs(1)).await;
        }
    });

    let mut sink = |_: DeviceRole, _: &SerialRecord| {};
    let started = tokio::time::Instant::now();
    let err = await_result(rx_rx, tx_rx, &timing(), &mut sink)
        .await
        .expect_err("times out");
    assert!(matches!(err, SweepError::ProtocolTimeout(_)));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn sending_records_rearm_the_watchdog() {
    let (_rx_tx, rx_rx) = mpsc::channel::<String>(16);
    let (tx_tx, tx_rx) = mpsc::channel(16);
    tokio::spawn(async move {
        for seq in 0..3 {
            sleep(Duration::from_secs(8)).await;
            tx_tx.send(format!(r#"{{"tx":{{"seq":{seq}}}}}"#)).await.ok();
        }
        sleep(Duration::from_secs(8)).await;
        tx_tx.send(r#"{"result":{"sent":3}}"#.to_string()).await.ok();
        sleep(Duration::from_secs(60)).await;
    });

    let mut sink = |_: DeviceRole, _: &SerialRecord| {};
    let outcome = await_result(rx_rx, tx_rx, &timing(), &mut sink)
        .await
        .expect("each record arrives inside the watchdog window");
    assert_eq!(outcome.accepted, 4);
}

#[tokio::test(start_paused = true)]
async fn garbage_lines_are_ignored_and_do_not_rearm() {
    let (_rx_tx, rx_rx) = mpsc::channel::<String>(16);
    let (tx_tx, tx_rx) = mpsc::channel(16);
    tokio::spawn(async move {
        for _ in 0..5 {
            sleep(Duration::from_secs(3)).await;
            tx_tx.send("boot: contiki 2.7".to_string()).await.ok();
        }
    });

    let mut sink = Collected::default();
    let err = await_result(rx_rx, tx_rx, &timing(), &mut sink)
        .await
        .expect_err("garbage never satisfies the watchdog");
    assert!(sink.0.is_empty());
    assert!(matches!(err, SweepError::ProtocolTimeout(ref info) if info.context["discarded"] == "3"));
}

#[tokio::test(start_paused = true)]
async fn first_terminal_record_wins() {
    let (_rx_tx, rx_rx) = mpsc::channel::<String>(16);
    let (tx_tx, tx_rx) = mpsc::channel(16);
    tx_tx
        .send(r#"{"result":{"sent":10,"failed":1}}"#.to_string())
        .await
        .expect("send");
    tx_tx
        .send(r#"{"result":{"sent":99,"failed":0}}"#.to_string())
        .await
        .expect("send");

    let mut sink = Collected::default();
    let outcome = await_result(rx_rx, tx_rx, &timing(), &mut sink)
        .await
        .expect("resolves");
    let sent = outcome
        .terminal
        .result()
        .and_then(|result| result.get("sent"))
        .and_then(|sent| sent.as_u64());
    assert_eq!(sent, Some(10));
    assert_eq!(sink.0.len(), 2);
}
