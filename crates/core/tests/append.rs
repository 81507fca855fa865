//! End-to-end tests for the append pipeline against the simulated page.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use htmlsplice_core::dom::NodeId;
use htmlsplice_core::sim::{Resource, SimHost};
use htmlsplice_core::{
    append_html, AppendError, AppendOptions, ScriptOutcome, WaitOutcome, DEFAULT_SCRIPT_TIMEOUT,
};
use pretty_assertions::assert_eq;
use tokio::time::Instant;

fn assert_elapsed(start: Instant, millis: u64) {
    let elapsed = start.elapsed();
    let expected = Duration::from_millis(millis);
    assert!(
        elapsed >= expected && elapsed <= expected + Duration::from_millis(1),
        "expected ~{:?}, got {:?}",
        expected,
        elapsed
    );
}

fn children_html(host: &SimHost, container: NodeId) -> Vec<String> {
    let document = host.document();
    document
        .children(container)
        .iter()
        .map(|&child| document.outer_html(child))
        .collect()
}

fn script_count(host: &SimHost, container: NodeId) -> usize {
    let document = host.document();
    document
        .children(container)
        .iter()
        .filter(|&&child| document.tag_name(child) == Some("script"))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_append_plain_text() {
    let host = SimHost::new();
    let container = host.container("div").unwrap();

    let report = append_html(&host, "Foo Bar", &container, &AppendOptions::default())
        .await
        .unwrap();

    assert_eq!(host.inner_html(container), "Foo Bar");
    assert_eq!(
        host.document().text_content(container).as_deref(),
        Some("Foo Bar")
    );
    assert_eq!(script_count(&host, container), 0);
    assert_eq!(report.nodes_appended, 1);
    assert!(report.scripts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_append_html_children() {
    let host = SimHost::new();
    let container = host.container("div").unwrap();

    append_html(&host, "<p>Foo</p>Bar<p>Baz</p>", &container, &AppendOptions::default())
        .await
        .unwrap();

    assert_eq!(children_html(&host, container), vec!["<p>Foo</p>", "Bar", "<p>Baz</p>"]);
}

#[tokio::test(start_paused = true)]
async fn test_append_keeps_existing_children() {
    let host = SimHost::new();
    let container = host.container("div").unwrap();

    append_html(&host, "<p>one</p>", &container, &AppendOptions::default())
        .await
        .unwrap();
    append_html(&host, "<p>two</p>", &container, &AppendOptions::default())
        .await
        .unwrap();

    assert_eq!(host.inner_html(container), "<p>one</p><p>two</p>");
}

#[tokio::test(start_paused = true)]
async fn test_append_single_inline_script() {
    let host = SimHost::new();
    let container = host.container("div").unwrap();
    let html = "<script>const foo = 'bar';</script>";

    let report = append_html(&host, html, &container, &AppendOptions::default())
        .await
        .unwrap();

    assert_eq!(children_html(&host, container), vec![html]);
    assert_eq!(report.scripts.len(), 1);
    assert_eq!(report.scripts[0].wait, WaitOutcome::Loaded);

    let runs = host.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].source.as_deref(), Some("const foo = 'bar';"));
}

#[tokio::test(start_paused = true)]
async fn test_append_inline_scripts_share_counter() {
    let host = SimHost::new();
    let container = host.container("div").unwrap();

    let counter = Rc::new(RefCell::new(Vec::new()));
    let seen = counter.clone();
    host.on_run(move |run| {
        let mut seen = seen.borrow_mut();
        let value = seen.len() + 1;
        seen.push((value, run.source.clone().unwrap_or_default()));
    });

    let html = "<script>window.counter = 1;</script><p>between</p><script>window.counter += 1;</script>";
    let start = Instant::now();
    append_html(&host, html, &container, &AppendOptions::default())
        .await
        .unwrap();

    // Inline scripts settle immediately; the timer never fires.
    assert_elapsed(start, 0);
    assert_eq!(
        *counter.borrow(),
        vec![
            (1, "window.counter = 1;".to_string()),
            (2, "window.counter += 1;".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_append_copies_attributes_exactly() {
    let host = SimHost::new()
        .with_resource("a.js", Resource::load(10))
        .with_resource("b.js", Resource::load(10));
    let container = host.container("div").unwrap();

    let html = concat!(
        "<script src=\"a.js\" data-id=\"1\" crossorigin=\"anonymous\"></script>",
        "<script src=\"b.js\" type=\"module\" defer=\"\"></script>",
        "<script id=\"cfg\" type=\"text/javascript\">setup({\"a\": 1});</script>",
    );
    append_html(&host, html, &container, &AppendOptions::default())
        .await
        .unwrap();

    assert_eq!(
        children_html(&host, container),
        vec![
            "<script src=\"a.js\" data-id=\"1\" crossorigin=\"anonymous\"></script>",
            "<script src=\"b.js\" type=\"module\" defer=\"\"></script>",
            "<script id=\"cfg\" type=\"text/javascript\">setup({\"a\": 1});</script>",
        ]
    );

    let document = host.document();
    for &child in document.children(container) {
        assert!(document.element(child).unwrap().already_started);
    }
}

#[tokio::test(start_paused = true)]
async fn test_append_waits_for_each_remote_script_in_order() {
    let host = SimHost::new()
        .with_resource("slow.js", Resource::load(300))
        .with_resource("fast.js", Resource::load(50));
    let container = host.container("div").unwrap();

    let html = "A<script src=\"slow.js\"></script>B<script>inline()</script>C<script src=\"fast.js\"></script>D";
    let start = Instant::now();
    let report = append_html(&host, html, &container, &AppendOptions::default())
        .await
        .unwrap();

    // Strictly sequential: 300ms for slow.js, then 50ms for fast.js.
    assert_elapsed(start, 350);

    let runs = host.runs();
    let order: Vec<String> = runs
        .iter()
        .map(|r| r.src.clone().or(r.source.clone()).unwrap_or_default())
        .collect();
    assert_eq!(order, vec!["slow.js", "inline()", "fast.js"]);
    assert!((300..=301).contains(&runs[1].at_ms));

    assert_eq!(
        host.inner_html(container),
        "A<script src=\"slow.js\"></script>B<script>inline()</script>C<script src=\"fast.js\"></script>D"
    );
    assert_eq!(report.segments, 7);
    assert_eq!(report.nodes_appended, 7);
    assert!(report.scripts.iter().all(|s| s.wait == WaitOutcome::Loaded));
}

#[tokio::test(start_paused = true)]
async fn test_append_markup_after_script_waits_for_it() {
    let host = SimHost::new().with_resource("lib.js", Resource::load(100));
    let container = host.container("div").unwrap();

    let snapshots = Rc::new(RefCell::new(Vec::new()));
    let seen = snapshots.clone();
    host.on_run(move |run| seen.borrow_mut().push(run.src.clone()));

    let html = "<script src=\"lib.js\"></script><p>after</p>";
    let options = AppendOptions::default();
    let task = append_html(&host, html, &container, &options);
    let result = tokio::select! {
        result = task => Some(result),
        _ = tokio::time::sleep(Duration::from_millis(50)) => None,
    };

    // Cut off mid-wait: the paragraph must not be there yet.
    assert!(result.is_none());
    assert_eq!(children_html(&host, container), vec!["<script src=\"lib.js\"></script>"]);
    assert!(snapshots.borrow().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_append_timeout_resolves() {
    let host = SimHost::new();
    let container = host.container("div").unwrap();

    let start = Instant::now();
    let report = append_html(
        &host,
        "<script src=\"unreachable.js\"></script><p>after</p>",
        &container,
        &AppendOptions::with_timeout_ms(500),
    )
    .await
    .unwrap();

    assert_elapsed(start, 500);
    assert_eq!(report.scripts[0].wait, WaitOutcome::TimedOut);
    assert_eq!(report.timed_out(), 1);
    assert_eq!(
        children_html(&host, container),
        vec!["<script src=\"unreachable.js\"></script>", "<p>after</p>"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_append_default_timeout_is_two_seconds() {
    let host = SimHost::new();
    let container = host.container("div").unwrap();

    let start = Instant::now();
    append_html(
        &host,
        "<script src=\"unreachable.js\"></script>",
        &container,
        &AppendOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(DEFAULT_SCRIPT_TIMEOUT, Duration::from_millis(2000));
    assert_elapsed(start, 2000);
}

#[tokio::test(start_paused = true)]
async fn test_append_load_beats_timeout() {
    let host = SimHost::new().with_resource("quick.js", Resource::load(20));
    let container = host.container("div").unwrap();

    let start = Instant::now();
    let report = append_html(
        &host,
        "<script src=\"quick.js\"></script>",
        &container,
        &AppendOptions::with_timeout_ms(1000),
    )
    .await
    .unwrap();

    assert_elapsed(start, 20);
    assert_eq!(report.scripts[0].wait, WaitOutcome::Loaded);
}

#[tokio::test(start_paused = true)]
async fn test_append_timed_out_fetch_keeps_going() {
    let host = SimHost::new().with_resource("late.js", Resource::load(800));
    let container = host.container("div").unwrap();

    append_html(
        &host,
        "<script src=\"late.js\"></script>",
        &container,
        &AppendOptions::with_timeout_ms(100),
    )
    .await
    .unwrap();

    // The wait gave up, the network did not.
    assert!(host.runs().is_empty());
    assert_eq!(host.pending_fetches(), 1);
    assert_eq!(host.drain().await, 1);
    let runs = host.runs();
    assert_eq!(runs[0].src.as_deref(), Some("late.js"));
    assert!((800..=801).contains(&runs[0].at_ms));
}

#[tokio::test(start_paused = true)]
async fn test_append_load_error_rejects_and_stops() {
    let host = SimHost::new().with_resource("broken.js", Resource::fail(10));
    let container = host.container("div").unwrap();

    let html = "<p>before</p><script src=\"broken.js\"></script><p>after</p><script>never()</script>";
    let err = append_html(&host, html, &container, &AppendOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AppendError::ScriptLoad {
            segment: 1,
            src: Some("broken.js".to_string()),
        }
    );
    assert_eq!(err.to_string(), "Script broken.js (segment 1) failed to load");
    // Partial application: nothing is rolled back, nothing after runs.
    assert_eq!(
        host.inner_html(container),
        "<p>before</p><script src=\"broken.js\"></script>"
    );
    let runs = host.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].outcome, ScriptOutcome::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_append_async_script_does_not_block() {
    let host = SimHost::new().with_resource("unreachable", Resource::load(5000));
    let container = host.container("div").unwrap();

    let start = Instant::now();
    let report = append_html(
        &host,
        "<script src=\"unreachable\" async></script><p>after</p><script>next()</script>",
        &container,
        &AppendOptions::default(),
    )
    .await
    .unwrap();

    assert_elapsed(start, 0);
    assert_eq!(report.scripts[0].wait, WaitOutcome::Skipped);
    assert_eq!(
        children_html(&host, container),
        vec![
            "<script src=\"unreachable\" async=\"\"></script>",
            "<p>after</p>",
            "<script>next()</script>",
        ]
    );

    // The later inline script ran before the async one arrived.
    let runs = host.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].source.as_deref(), Some("next()"));

    assert_eq!(host.drain().await, 1);
    let runs = host.runs();
    assert_eq!(runs[1].src.as_deref(), Some("unreachable"));
    assert!((5000..=5001).contains(&runs[1].at_ms));
}

#[tokio::test(start_paused = true)]
async fn test_append_async_failure_is_not_an_error() {
    let host = SimHost::new().with_resource("bad.js", Resource::fail(0));
    let container = host.container("div").unwrap();

    let result = append_html(
        &host,
        "<script async src=\"bad.js\"></script>",
        &container,
        &AppendOptions::default(),
    )
    .await;

    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_append_non_javascript_type_times_out() {
    let host = SimHost::new();
    let container = host.container("div").unwrap();

    let start = Instant::now();
    let report = append_html(
        &host,
        "<script type=\"text/template\"><b>{{name}}</b></script><p>after</p>",
        &container,
        &AppendOptions::with_timeout_ms(300),
    )
    .await
    .unwrap();

    assert_elapsed(start, 300);
    assert_eq!(report.scripts[0].wait, WaitOutcome::TimedOut);
    assert!(host.runs().is_empty());
    assert_eq!(
        children_html(&host, container),
        vec![
            "<script type=\"text/template\"><b>{{name}}</b></script>",
            "<p>after</p>",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_append_unclosed_script_is_inert_markup() {
    let host = SimHost::new();
    let container = host.container("div").unwrap();

    let report = append_html(
        &host,
        "<p>x</p><script>never()",
        &container,
        &AppendOptions::default(),
    )
    .await
    .unwrap();

    assert!(report.scripts.is_empty());
    assert!(host.runs().is_empty());
    assert_eq!(script_count(&host, container), 1);
}

#[tokio::test(start_paused = true)]
async fn test_append_one_script_element_per_segment() {
    let host = SimHost::new();
    let container = host.container("div").unwrap();

    let html = "<script>1</script><script>2</script><div><script>3</script></div>";
    let report = append_html(&host, html, &container, &AppendOptions::default())
        .await
        .unwrap();

    // The third script was cut out of its <div>, which the parser closes.
    assert_eq!(report.scripts.len(), 3);
    assert_eq!(script_count(&host, container), 3);
    assert_eq!(host.runs().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_append_keeps_template_content() {
    let host = SimHost::new();
    let container = host.container("div").unwrap();
    let html = "<template><p>row</p></template><p>after</p>";

    append_html(&host, html, &container, &AppendOptions::default())
        .await
        .unwrap();

    assert_eq!(host.inner_html(container), html);
}

#[tokio::test(start_paused = true)]
async fn test_append_rejects_leaf_container() {
    let host = SimHost::new();
    let parent = host.container("div").unwrap();
    append_html(&host, "text<!-- note -->", &parent, &AppendOptions::default())
        .await
        .unwrap();
    let leaves = host.document().children(parent).to_vec();
    assert_eq!(leaves.len(), 2);

    for leaf in leaves {
        let err = append_html(&host, "<script>x()</script>", &leaf, &AppendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppendError::InvalidContainer(_)));
    }
    assert!(host.runs().is_empty());
    assert_eq!(host.inner_html(parent), "text<!-- note -->");
}

#[tokio::test(start_paused = true)]
async fn test_append_into_shadow_root() {
    let host = SimHost::new().with_resource("widget.js", Resource::load(40));
    let shadow = host.shadow_container("x-widget").unwrap();

    let report = append_html(
        &host,
        "<p>a</p><script src=\"widget.js\"></script><script>init()</script>",
        &shadow,
        &AppendOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(
        host.inner_html(shadow),
        "<p>a</p><script src=\"widget.js\"></script><script>init()</script>"
    );
    assert_eq!(report.scripts[0].wait, WaitOutcome::Loaded);
    let runs: Vec<_> = host
        .runs()
        .into_iter()
        .map(|run| run.src.or(run.source).unwrap_or_default())
        .collect();
    assert_eq!(runs, vec!["widget.js", "init()"]);
}

#[tokio::test(start_paused = true)]
async fn test_append_into_detached_fragment() {
    let host = SimHost::new().with_resource("a.js", Resource::load(10));
    let fragment = host.fragment();
    let options = AppendOptions::with_timeout_ms(300);

    let start = Instant::now();
    let report = append_html(
        &host,
        "<p>a</p><script src=\"a.js\"></script>",
        &fragment,
        &options,
    )
    .await
    .unwrap();

    // Scripts outside the page never start, so the wait runs out.
    assert_elapsed(start, 300);
    assert_eq!(report.scripts[0].wait, WaitOutcome::TimedOut);
    assert!(host.runs().is_empty());
    assert_eq!(host.inner_html(fragment), "<p>a</p><script src=\"a.js\"></script>");
}

#[tokio::test(start_paused = true)]
async fn test_append_report_serializes() {
    let host = SimHost::new();
    let container = host.container("div").unwrap();
    let report = append_html(
        &host,
        "<script src=\"x.js\" async></script>",
        &container,
        &AppendOptions::default(),
    )
    .await
    .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["scripts"][0]["wait"], "skipped");
    assert_eq!(json["scripts"][0]["src"], "x.js");
    assert_eq!(json["segments"], 3);
}
