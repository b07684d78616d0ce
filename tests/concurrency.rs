mod common;

use std::fs;
use std::sync::Arc;

use common::request;
use gmonad::logger::Format;
use gmonad::middleware::{Cors, CorsPolicy};
use gmonad::{Dispatcher, Logger, Method, Request, Router};

async fn item(req: Request) -> String {
    tokio::task::yield_now().await;
    format!("item {}", req.param("id").unwrap_or(""))
}

// The logger is process-wide, so this binary holds a single test. The runtime
// is built by hand so the environment is cleaned before any worker starts.
#[test]
fn parallel_requests_each_log_one_well_formed_line() {
    const N: usize = 500;

    // SAFETY: no other thread exists yet.
    unsafe { std::env::remove_var("RUST_LOG") };

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("requests.log");
    let logger = Logger::init_with_format(path.to_str().unwrap(), "info", Format::Json).unwrap();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(8)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let policy = CorsPolicy::builder()
            .allow_origin("*")
            .allow_method(Method::Get)
            .build()
            .unwrap();
        let app = Arc::new(
            Dispatcher::new(Router::new().get("/items/{id}", item)).register(Cors::new(policy)),
        );

        let tasks: Vec<_> = (0..N)
            .map(|i| {
                let app = Arc::clone(&app);
                tokio::spawn(async move {
                    let path = format!("/items/{i}");
                    let res = app
                        .dispatch(request("GET", &path, &[("origin", "https://client.dev")]))
                        .await;
                    assert_eq!(res.body(), format!("item {i}").as_bytes());
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
    });
    drop(runtime);

    // Flushes the background writer.
    drop(logger);

    let output = fs::read_to_string(&path).unwrap();
    let events: Vec<serde_json::Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).expect("every log line is one JSON object"))
        .collect();

    let completed: Vec<_> = events
        .iter()
        .filter(|event| event["fields"]["message"] == "request completed")
        .collect();

    assert_eq!(completed.len(), N);
    assert_eq!(events.len(), N + 1, "only the init line besides the requests");
    for event in completed {
        assert_eq!(event["level"], "INFO");
        assert_eq!(event["fields"]["status"], 200);
        assert_eq!(event["fields"]["method"], "GET");
    }
}
