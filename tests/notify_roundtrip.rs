// tests/notify_roundtrip.rs
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use news_ranker::notify::{Delivery, Notification, NotificationHandler, Notifier, RegionReceiver, SocketNotifier};

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationHandler for Recorder {
    async fn handle(&self, note: &Notification) -> Result<()> {
        self.seen.lock().push(note.clone());
        Ok(())
    }
}

struct Exploding;

#[async_trait]
impl NotificationHandler for Exploding {
    async fn handle(&self, _note: &Notification) -> Result<()> {
        anyhow::bail!("cluster stage failed")
    }
}

fn notifier_for(region: &str, port: u16) -> SocketNotifier {
    let ports: BTreeMap<String, u16> = [(region.to_string(), port)].into_iter().collect();
    SocketNotifier::new("127.0.0.1", ports).with_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn matching_payload_reaches_the_handler() {
    let receiver = RegionReceiver::bind("us", "127.0.0.1:0").await.unwrap();
    let port = receiver.local_addr().unwrap().port();
    let handler = Recorder::default();
    let note = Notification::summarize("us", "wire", "raw/us/2024-01-01/wire/fetched_x.json");

    let notifier = notifier_for("us", port);
    let (delivery, ()) = tokio::join!(receiver.accept_one(&handler), notifier.send(&note));
    assert_eq!(delivery.unwrap(), Delivery::Handled);
    assert_eq!(handler.seen.lock().clone(), vec![note]);
}

#[tokio::test]
async fn payload_for_another_region_is_ignored() {
    let receiver = RegionReceiver::bind("us", "127.0.0.1:0").await.unwrap();
    let port = receiver.local_addr().unwrap().port();
    let handler = Recorder::default();

    // Misrouted: the "eu" port points at the us receiver.
    let notifier = notifier_for("eu", port);
    let note = Notification::summarize("eu", "bbc", "raw/eu/2024-01-01/bbc/fetched_x.json");
    let (delivery, ()) = tokio::join!(receiver.accept_one(&handler), notifier.send(&note));
    assert_eq!(delivery.unwrap(), Delivery::Ignored("eu".into()));
    assert!(handler.seen.lock().is_empty());
}

#[tokio::test]
async fn malformed_and_failing_messages_do_not_stop_the_receiver() {
    let receiver = RegionReceiver::bind("us", "127.0.0.1:0").await.unwrap();
    let addr = receiver.local_addr().unwrap();
    let handler = Recorder::default();

    let garbage = async {
        let mut s = TcpStream::connect(addr).await.unwrap();
        s.write_all(b"not json").await.unwrap();
        s.shutdown().await.unwrap();
    };
    let (delivery, ()) = tokio::join!(receiver.accept_one(&handler), garbage);
    assert!(matches!(delivery.unwrap(), Delivery::Malformed(_)));

    let empty = async {
        let s = TcpStream::connect(addr).await.unwrap();
        drop(s);
    };
    let (delivery, ()) = tokio::join!(receiver.accept_one(&handler), empty);
    assert_eq!(delivery.unwrap(), Delivery::Empty);

    let notifier = notifier_for("us", addr.port());
    let note = Notification::summarize("us", "wire", "raw/us/2024-01-01/wire/fetched_y.json");
    let (delivery, ()) = tokio::join!(receiver.accept_one(&Exploding), notifier.send(&note));
    match delivery.unwrap() {
        Delivery::Failed(reason) => assert!(reason.contains("cluster stage failed")),
        other => panic!("unexpected delivery: {other:?}"),
    }
    assert!(handler.seen.lock().is_empty());
}

#[tokio::test]
async fn sending_to_a_closed_port_is_not_an_error() {
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let note = Notification::summarize("us", "wire", "raw/us/2024-01-01/wire/fetched_z.json");
    notifier_for("us", port).send(&note).await;

    // No port configured for the region at all.
    SocketNotifier::new("127.0.0.1", BTreeMap::new()).send(&note).await;
}

#[tokio::test]
async fn serve_keeps_accepting_after_bad_messages() {
    let receiver = RegionReceiver::bind("us", "127.0.0.1:0").await.unwrap();
    let addr = receiver.local_addr().unwrap();
    let handler = Arc::new(Recorder::default());

    let serving = {
        let handler = handler.clone();
        tokio::spawn(async move { receiver.serve(handler.as_ref()).await })
    };

    let mut s = TcpStream::connect(addr).await.unwrap();
    s.write_all(b"{ broken").await.unwrap();
    s.shutdown().await.unwrap();
    drop(s);

    let note = Notification::summarize("us", "wire", "raw/us/2024-01-01/wire/fetched_s.json");
    notifier_for("us", addr.port()).send(&note).await;

    for _ in 0..100 {
        if !handler.seen.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(handler.seen.lock().clone(), vec![note]);
    assert!(!serving.is_finished());
    serving.abort();
}
