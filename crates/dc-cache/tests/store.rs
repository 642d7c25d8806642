//! End-to-end behavior of `DocumentStore`.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dc_cache::{
    BoxError, CacheError, CacheEvent, CacheObserver, CacheOptions, DocumentStore, ErrorReporting,
    IgnoreFile, Modifier, ScopedLoader, modifier_fn,
};
use dc_dom::{Document, Element};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::sync::{Notify, mpsc};

const TEST1: &str = "<!DOCTYPE html>
<html>
<head><title>a first page</title></head>
<body>
<h1>My first page</h1>
</body>
</html>
";

fn site(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

fn unwatched() -> CacheOptions {
    CacheOptions::new(IgnoreFile::Disabled).with_watch(false)
}

fn watched(ignore_file: PathBuf) -> CacheOptions {
    CacheOptions::new(IgnoreFile::Path(ignore_file)).with_debounce(Duration::from_millis(10))
}

fn counting(runs: &Arc<AtomicUsize>) -> impl Modifier + 'static {
    let runs = Arc::clone(runs);
    modifier_fn("count", move |_, _| {
        runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn h1(doc: &Document) -> String {
    doc.find("h1").map(Element::text_content).unwrap_or_default()
}

/// Poll `check` until it holds or five seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<CacheEvent>>,
}

impl Recorder {
    fn events(&self) -> Vec<CacheEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CacheObserver for Recorder {
    fn observe(&self, event: &CacheEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[tokio::test]
async fn test_get_parses_title_and_heading() {
    let dir = site(&[("test1.html", TEST1)]);
    let store = DocumentStore::open(dir.path(), unwatched()).unwrap();

    let doc = store.get("test1").await.unwrap();

    assert_eq!(doc.title().as_deref(), Some("a first page"));
    assert_eq!(h1(&doc), "My first page");
}

#[tokio::test]
async fn test_header_step_applies_to_every_page() {
    let dir = site(&[
        ("test1.html", TEST1),
        ("other.html", "<body><p>first</p><p>second</p></body>"),
    ]);
    let options = unwatched().with_modifier(modifier_fn("header", |doc, _| {
        doc.body_mut()
            .prepend_child(Element::new("header").with_text("Site"));
        Ok(())
    }));
    let store = DocumentStore::open(dir.path(), options).unwrap();

    for name in ["test1", "other"] {
        let doc = store.get(name).await.unwrap();
        let first = doc.body().unwrap().first_element_child().unwrap();
        assert_eq!(first.name, "header", "page {name}");
        assert_eq!(first.text_content(), "Site");
    }
}

#[tokio::test]
async fn test_steps_apply_in_registration_order() {
    let dir = site(&[("test1.html", TEST1)]);
    let marker = |text: &'static str| {
        modifier_fn(text, move |doc, _| {
            doc.body_mut()
                .append_child(Element::new("span").with_text(text));
            Ok(())
        })
    };
    let options = unwatched().with_modifier(marker("A")).with_modifier(marker("B"));
    let store = DocumentStore::open(dir.path(), options).unwrap();

    let doc = store.get("test1").await.unwrap();

    let last_two: Vec<String> = doc
        .body()
        .unwrap()
        .element_children()
        .rev()
        .take(2)
        .map(Element::text_content)
        .collect();
    assert_eq!(last_two, vec!["B", "A"]);
}

#[tokio::test]
async fn test_copies_are_independent() {
    let dir = site(&[("test1.html", TEST1)]);
    let store = DocumentStore::open(dir.path(), unwatched()).unwrap();

    let mut first = store.get("test1").await.unwrap();
    let second = store.get("test1").await.unwrap();
    assert_eq!(first, second);

    first.find_mut("h1").unwrap().set_text("changed");
    first.body_mut().append_child(Element::new("p"));

    assert_eq!(h1(&second), "My first page");
    assert_eq!(h1(&store.get("test1").await.unwrap()), "My first page");
}

#[tokio::test]
async fn test_force_reload_picks_up_new_content() {
    let dir = site(&[("test1.html", TEST1)]);
    let runs = Arc::new(AtomicUsize::new(0));
    let options = unwatched().with_modifier(counting(&runs));
    let store = DocumentStore::open(dir.path(), options).unwrap();

    assert_eq!(h1(&store.get("test1").await.unwrap()), "My first page");
    fs::write(dir.path().join("test1.html"), "<h1>Second version</h1>").unwrap();
    assert_eq!(h1(&store.get("test1").await.unwrap()), "My first page");

    let reloaded = store.force_reload("test1").await.unwrap();

    assert_eq!(h1(&reloaded), "Second version");
    assert_eq!(h1(&store.get("test1").await.unwrap()), "Second version");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_force_reload_of_uncached_page_installs_it() {
    let dir = site(&[("test1.html", TEST1)]);
    let store = DocumentStore::open(dir.path(), unwatched()).unwrap();

    store.force_reload("test1").await.unwrap();

    assert!(store.is_cached("test1"));
}

#[tokio::test]
async fn test_missing_page_is_not_found() {
    let dir = site(&[]);
    let store = DocumentStore::open(dir.path(), unwatched()).unwrap();

    let err = store.get("nothing").await.unwrap_err();

    assert!(matches!(err, CacheError::NotFound { ref name, .. } if name == "nothing"));
    assert!(err.is_not_found());
    assert!(!store.is_cached("nothing"));
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_entry() {
    let dir = site(&[("test1.html", TEST1)]);
    let fail = Arc::new(AtomicBool::new(false));
    let switch = Arc::clone(&fail);
    let options = unwatched().with_modifier(modifier_fn("flaky", move |_, _| {
        if switch.load(Ordering::SeqCst) {
            return Err("step failed".into());
        }
        Ok(())
    }));
    let store = DocumentStore::open(dir.path(), options).unwrap();
    store.get("test1").await.unwrap();

    fs::write(dir.path().join("test1.html"), "<h1>Half done</h1>").unwrap();
    fail.store(true, Ordering::SeqCst);
    let err = store.force_reload("test1").await.unwrap_err();
    assert!(matches!(err, CacheError::Pipeline { ref step, .. } if step == "flaky"));

    fs::write(dir.path().join("test1.html"), "<h1>broken<!-- never closed").unwrap();
    fail.store(false, Ordering::SeqCst);
    let err = store.force_reload("test1").await.unwrap_err();
    assert!(matches!(err, CacheError::Parse { .. }), "{err:?}");

    assert_eq!(h1(&store.get("test1").await.unwrap()), "My first page");
}

#[tokio::test]
async fn test_failed_pipeline_caches_nothing() {
    let dir = site(&[("test1.html", TEST1)]);
    let options = unwatched().with_modifier(modifier_fn("broken", |_, _| Err("nope".into())));
    let store = DocumentStore::open(dir.path(), options).unwrap();

    assert!(store.get("test1").await.is_err());
    assert!(!store.is_cached("test1"));
}

struct SlowCounter {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Modifier for SlowCounter {
    fn name(&self) -> &str {
        "slow-counter"
    }

    async fn modify(
        &self,
        _doc: &mut Document,
        _loader: &mut ScopedLoader<'_>,
    ) -> Result<(), BoxError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_concurrent_gets_share_one_load() {
    let dir = site(&[("x.html", TEST1)]);
    let runs = Arc::new(AtomicUsize::new(0));
    let options = unwatched().with_modifier(SlowCounter {
        runs: Arc::clone(&runs),
    });
    let store = DocumentStore::open(dir.path(), options).unwrap();

    let (a, b) = tokio::join!(store.get("x"), store.get("x"));

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gets_share_one_load_across_threads() {
    let dir = site(&[("x.html", TEST1)]);
    let runs = Arc::new(AtomicUsize::new(0));
    let options = unwatched().with_modifier(SlowCounter {
        runs: Arc::clone(&runs),
    });
    let store = Arc::new(DocumentStore::open(dir.path(), options).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get("x").await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_step_does_not_wedge_page() {
    let dir = site(&[("a.html", TEST1)]);
    let armed = Arc::new(AtomicBool::new(true));
    let trigger = Arc::clone(&armed);
    let options = unwatched().with_modifier(modifier_fn("explode", move |_, _| {
        if trigger.swap(false, Ordering::SeqCst) {
            panic!("step failure");
        }
        Ok(())
    }));
    let store = DocumentStore::open(dir.path(), options).unwrap();

    let err = store.get("a").await.unwrap_err();
    assert!(matches!(err, CacheError::Aborted { .. }));
    assert!(!store.is_cached("a"));

    let doc = store.get("a").await.unwrap();
    assert_eq!(h1(&doc), "My first page");
    assert!(store.is_cached("a"));
}

/// Holds run `n` of the pipeline until `gates[n]` is released.
struct Gated {
    runs: AtomicUsize,
    entered: mpsc::UnboundedSender<usize>,
    gates: Vec<Arc<Notify>>,
}

impl Gated {
    fn new(count: usize) -> (Self, mpsc::UnboundedReceiver<usize>, Vec<Arc<Notify>>) {
        let (entered, rx) = mpsc::unbounded_channel();
        let gates: Vec<Arc<Notify>> = (0..count).map(|_| Arc::new(Notify::new())).collect();
        let step = Self {
            runs: AtomicUsize::new(0),
            entered,
            gates: gates.clone(),
        };
        (step, rx, gates)
    }
}

#[async_trait]
impl Modifier for Gated {
    fn name(&self) -> &str {
        "gated"
    }

    async fn modify(
        &self,
        _doc: &mut Document,
        _loader: &mut ScopedLoader<'_>,
    ) -> Result<(), BoxError> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        let _ = self.entered.send(run);
        if let Some(gate) = self.gates.get(run) {
            gate.notified().await;
        }
        Ok(())
    }
}

fn page(heading: &str) -> String {
    format!("<html><body><h1>{heading}</h1></body></html>")
}

#[tokio::test]
async fn test_overlapping_reloads_install_last_completed() {
    let dir = site(&[("p.html", page("v1").as_str())]);
    let (step, mut entered, gates) = Gated::new(2);
    let store = Arc::new(DocumentStore::open(dir.path(), unwatched().with_modifier(step)).unwrap());

    let first = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.force_reload("p").await }
    });
    assert_eq!(entered.recv().await, Some(0));

    fs::write(dir.path().join("p.html"), page("v2")).unwrap();
    let second = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.force_reload("p").await }
    });
    assert_eq!(entered.recv().await, Some(1));

    gates[1].notify_one();
    assert_eq!(h1(&second.await.unwrap().unwrap()), "v2");
    assert_eq!(h1(&store.get("p").await.unwrap()), "v2");

    gates[0].notify_one();
    assert_eq!(h1(&first.await.unwrap().unwrap()), "v1");
    assert_eq!(h1(&store.get("p").await.unwrap()), "v1");
}

#[tokio::test]
async fn test_reload_racing_cold_get_resolves_by_completion() {
    let dir = site(&[("p.html", page("v1").as_str())]);
    let (step, mut entered, gates) = Gated::new(2);
    let store = Arc::new(DocumentStore::open(dir.path(), unwatched().with_modifier(step)).unwrap());

    let cold = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.get("p").await }
    });
    assert_eq!(entered.recv().await, Some(0));

    fs::write(dir.path().join("p.html"), page("v2")).unwrap();
    let reload = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.force_reload("p").await }
    });
    assert_eq!(entered.recv().await, Some(1));

    gates[1].notify_one();
    assert_eq!(h1(&reload.await.unwrap().unwrap()), "v2");

    gates[0].notify_one();
    assert_eq!(h1(&cold.await.unwrap().unwrap()), "v1");
    assert_eq!(h1(&store.get("p").await.unwrap()), "v1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_does_not_cancel_load_in_progress() {
    let dir = site(&[("p.html", page("v1").as_str())]);
    let (step, mut entered, gates) = Gated::new(1);
    let options = watched(dir.path().join(".gitignore")).with_modifier(step);
    let store = Arc::new(DocumentStore::open(dir.path(), options).unwrap());

    let load = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.get("p").await }
    });
    assert_eq!(entered.recv().await, Some(0));

    store.stop();
    assert!(!store.is_watching());
    gates[0].notify_one();

    assert_eq!(h1(&load.await.unwrap().unwrap()), "v1");
    assert!(store.is_cached("p"));
}

struct Layout;

#[async_trait]
impl Modifier for Layout {
    fn name(&self) -> &str {
        "layout"
    }

    async fn modify(
        &self,
        doc: &mut Document,
        loader: &mut ScopedLoader<'_>,
    ) -> Result<(), BoxError> {
        let nav = loader
            .get("layout")
            .await?
            .find("nav")
            .cloned()
            .ok_or("layout has no nav")?;
        doc.body_mut().prepend_child(nav);
        Ok(())
    }
}

#[tokio::test]
async fn test_auxiliary_pages_stay_out_of_cache() {
    let dir = site(&[
        ("test1.html", TEST1),
        ("layout.html", "<nav><a href=\"/\">Home</a></nav>"),
    ]);
    let store = DocumentStore::open(dir.path(), unwatched().with_modifier(Layout)).unwrap();

    let doc = store.get("test1").await.unwrap();

    assert_eq!(doc.body().unwrap().first_element_child().unwrap().name, "nav");
    assert_eq!(store.cached_pages(), vec!["test1".to_owned()]);
}

#[tokio::test]
async fn test_builtin_scripts_are_embedded() {
    let dir = site(&[("test1.html", TEST1)]);
    let options = unwatched()
        .with_form_handling(true)
        .with_template_data(true);
    let store = DocumentStore::open(dir.path(), options).unwrap();

    let html = store.get("test1").await.unwrap().to_html();

    assert!(html.contains("window.formExtender"));
    assert!(html.contains("elementObject.add"));
    assert!(!html.contains("window.Q ="));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_content_change_reloads_page() {
    let dir = site(&[("test1.html", TEST1)]);
    let recorder = Arc::new(Recorder::default());
    let options =
        watched(dir.path().join(".gitignore")).with_observer(Arc::<Recorder>::clone(&recorder));
    let store = DocumentStore::open(dir.path(), options).unwrap();
    assert!(store.is_watching());
    store.get("test1").await.unwrap();

    fs::write(dir.path().join("test1.html"), "<h1>Edited</h1>").unwrap();

    let store = &store;
    let reloaded =
        eventually(|| async move { h1(&store.get("test1").await.unwrap()) == "Edited" }).await;
    assert!(reloaded, "events: {:?}", recorder.events());
    assert!(
        recorder
            .events()
            .contains(&CacheEvent::Reloaded { name: "test1".to_owned() })
    );
    store.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ignored_change_never_reloads() {
    let dir = site(&[
        ("ignored.html", "<h1>ignored v1</h1>"),
        ("watched.html", "<h1>watched v1</h1>"),
        (".gitignore", "ignored.html\n"),
    ]);
    let sentinel = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&sentinel);
    let options = watched(dir.path().join(".gitignore")).with_modifier(modifier_fn(
        "sentinel",
        move |doc, _| {
            if h1(doc).starts_with("ignored") {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        },
    ));
    let store = DocumentStore::open(dir.path(), options).unwrap();
    store.get("ignored").await.unwrap();
    store.get("watched").await.unwrap();
    assert_eq!(sentinel.load(Ordering::SeqCst), 1);

    fs::write(dir.path().join("ignored.html"), "<h1>ignored v2</h1>").unwrap();
    fs::write(dir.path().join("watched.html"), "<h1>watched v2</h1>").unwrap();

    let store = &store;
    let reloaded =
        eventually(|| async move { h1(&store.get("watched").await.unwrap()) == "watched v2" })
            .await;
    assert!(reloaded);
    assert_eq!(sentinel.load(Ordering::SeqCst), 1);
    assert_eq!(h1(&store.get("ignored").await.unwrap()), "ignored v1");
    store.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_is_idempotent_and_ends_reloads() {
    let dir = site(&[("test1.html", TEST1)]);
    let store = DocumentStore::open(dir.path(), watched(dir.path().join(".gitignore"))).unwrap();
    store.get("test1").await.unwrap();

    store.stop();
    store.stop();
    assert!(!store.is_watching());

    fs::write(dir.path().join("test1.html"), "<h1>After stop</h1>").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(h1(&store.get("test1").await.unwrap()), "My first page");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_file_is_reported_as_rename() {
    let dir = site(&[]);
    let recorder = Arc::new(Recorder::default());
    let options =
        watched(dir.path().join(".gitignore")).with_observer(Arc::<Recorder>::clone(&recorder));
    let store = DocumentStore::open(dir.path(), options).unwrap();

    fs::write(dir.path().join("fresh.html"), "<h1>new</h1>").unwrap();

    let expected = &CacheEvent::RenameUnsupported {
        file: PathBuf::from("fresh.html"),
    };
    let events = &recorder;
    let reported = eventually(|| async move { events.events().contains(expected) }).await;
    assert!(reported, "events: {:?}", recorder.events());
    store.stop();
}

#[tokio::test]
async fn test_unreadable_ignore_file_is_reported() {
    let dir = site(&[]);
    let recorder = Arc::new(Recorder::default());
    let missing = dir.path().join("no-such-ignore-file");
    let store = DocumentStore::open(
        dir.path(),
        watched(missing.clone()).with_observer(Arc::<Recorder>::clone(&recorder)),
    )
    .unwrap();

    let events = recorder.events();
    assert!(
        matches!(
            events.first(),
            Some(CacheEvent::IgnoreFileUnreadable { path, .. }) if path == &missing
        ),
        "{events:?}"
    );
    store.stop();
}

#[tokio::test]
async fn test_unreadable_ignore_file_silent_with_ignore_errors() {
    let dir = site(&[]);
    let recorder = Arc::new(Recorder::default());
    let options = watched(dir.path().join("no-such-ignore-file"))
        .with_error_reporting(ErrorReporting { ignore_errors: true })
        .with_observer(Arc::<Recorder>::clone(&recorder));

    let store = DocumentStore::open(dir.path(), options).unwrap();

    assert!(recorder.events().is_empty());
    store.stop();
}

#[tokio::test]
async fn test_ignore_file_resolver_runs_once() {
    let dir = site(&[(".gitignore", "*~\n")]);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let root = dir.path().to_path_buf();
    let ignore = IgnoreFile::Resolver(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        root.join(".gitignore")
    }));

    let store = DocumentStore::open(dir.path(), CacheOptions::new(ignore)).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    store.stop();
}
