use std::net::TcpListener;
use std::process::Command;

#[test]
fn occupied_port_exits_with_failure() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let output = Command::new(env!("CARGO_BIN_EXE_gmonad"))
        .env_remove("GMONAD_CONFIG")
        .env_remove("RUST_LOG")
        .env("GMONAD_SERVER_ADDR", &addr)
        .env("GMONAD_LOG_FILE", "stderr")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to bind"), "{stderr}");
}

#[test]
fn invalid_log_level_exits_before_binding() {
    let output = Command::new(env!("CARGO_BIN_EXE_gmonad"))
        .env_remove("GMONAD_CONFIG")
        .env("GMONAD_SERVER_ADDR", "127.0.0.1:0")
        .env("GMONAD_LOG_LEVEL", "chatty")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid log level"), "{stderr}");
}
