//! End-to-end meme lifecycle against in-memory collaborators.

use automemer_core::outbox;
use automemer_core::testing::{FakeSource, command_event, post};
use automemer_core::{
    CommandInterpreter, Database, Ingestor, MemeArchive, ReleaseEngine, Settings, SettingsStore,
    StagingStore,
};
use std::sync::Arc;

struct World {
    _dir: tempfile::TempDir,
    source: Arc<FakeSource>,
    archive: Arc<Database>,
    staging: Arc<StagingStore>,
    ingestor: Ingestor,
    release: Arc<ReleaseEngine>,
    interpreter: CommandInterpreter,
    rx: automemer_core::OutboxReceiver,
}

fn world(subs: &[&str], global: i64) -> World {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new());
    let archive = Arc::new(Database::open(&dir.path().join("memes.sqlite3")).unwrap());
    let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")));
    let staging = Arc::new(StagingStore::new(dir.path().join("scraped.json")));

    let mut initial = Settings::default();
    initial.watched_sources = subs.iter().map(|s| s.to_string()).collect();
    initial.thresholds.global = global;
    settings.lock().unwrap().write(&initial).unwrap();
    staging.ensure_exists().unwrap();

    let (tx, rx) = outbox::channel();
    let ingestor = Ingestor::new(source.clone(), archive.clone(), settings.clone(), staging.clone());
    let release = Arc::new(ReleaseEngine::new(
        settings.clone(),
        staging.clone(),
        archive.clone(),
        tx.clone(),
        "C_MEMES",
    ));
    let interpreter = CommandInterpreter::new(settings, release.clone(), ingestor.clone(), tx);

    World {
        _dir: dir,
        source,
        archive,
        staging,
        ingestor,
        release,
        interpreter,
        rx,
    }
}

#[tokio::test]
async fn published_memes_never_return() {
    let mut w = world(&["funny", "memes"], 100);
    w.source.set_hot(
        "funny",
        vec![post("f1", "Funny", 500), post("f2", "Funny", 20), post("f3", "Funny", 900)],
    );
    w.source.set_hot("memes", vec![post("m1", "memes", 300)]);

    let report = w.ingestor.run().await.unwrap();
    assert_eq!(report.inserted, 4);
    assert_eq!(w.staging.snapshot().unwrap().len(), 4);

    let released = w.release.release(None, false).unwrap();
    assert_eq!(released.released.len(), 3);
    assert!(w.staging.snapshot().unwrap().is_empty());
    let texts: Vec<_> = w.rx.drain().into_iter().map(|m| m.text).collect();
    assert_eq!(texts.len(), 3);
    assert!(texts.iter().all(|t| t.contains("_(from /r/")));

    // Upstream still lists the same posts; only the rejected one comes back
    let report = w.ingestor.run().await.unwrap();
    assert_eq!(report.updated, 4);
    let staged = w.staging.snapshot().unwrap();
    let ids: Vec<_> = staged.values().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["f2"]);

    for id in ["f1", "f3", "m1"] {
        assert!(w.archive.get(id).unwrap().unwrap().published, "{id} should be published");
    }
}

#[tokio::test]
async fn late_bloomer_is_released_after_rescrape() {
    let mut w = world(&["funny"], 100);
    w.source.set_hot("funny", vec![post("f1", "funny", 10)]);
    w.ingestor.run().await.unwrap();

    // Below threshold: inspected and dropped from staging
    let report = w.release.release(None, false).unwrap();
    assert!(report.released.is_empty());
    assert!(w.staging.snapshot().unwrap().is_empty());

    w.source.set_score("f1", 250);
    w.ingestor.run().await.unwrap();
    let report = w.release.release(None, false).unwrap();
    assert_eq!(report.released, vec!["f1".to_string()]);
    assert!(w.rx.drain()[0].text.contains("`250`"));
}

#[tokio::test]
async fn chat_commands_drive_the_pipeline() {
    let mut w = world(&["funny"], 1000);

    w.interpreter.handle(&command_event("add memes")).await;
    w.interpreter.handle(&command_event("set threshold 10")).await;
    assert_eq!(w.rx.drain().len(), 2);

    w.source.set_hot("funny", vec![post("f1", "funny", 50)]);
    w.source.set_hot("memes", vec![post("m1", "memes", 60), post("m2", "memes", 70)]);
    w.ingestor.run().await.unwrap();

    w.interpreter.handle(&command_event("num-memes postable_only by_sub")).await;
    let reply = w.rx.try_recv().unwrap().text;
    assert!(reply.contains("*funny*: 1\n*memes*: 2\n\n*Combined*: 3"));

    w.interpreter.handle(&command_event("pop 2")).await;
    let released: Vec<_> = w.rx.drain().into_iter().map(|m| m.text).collect();
    assert_eq!(released.len(), 2);
    assert!(released.iter().any(|t| t.contains("/r/funny")));
    assert!(released.iter().any(|t| t.contains("/r/memes")));
}
