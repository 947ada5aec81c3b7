//! In-process driver demo — a scripted peer on a socketpair plays the
//! driver role: it announces one object, answers calls, emits an event
//! after each greeting and disposes the object on quit.
//!
//! Run with:
//!   cargo run --example loopback

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use pilotwire::conn::{ConnConfig, Connection, TypeRegistry};
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    let (client, driver) = UnixStream::pair()?;
    let driver_thread = std::thread::spawn(move || {
        if let Err(e) = run_driver(driver) {
            eprintln!("driver stopped: {e}");
        }
    });

    let connection = Connection::start(
        client.try_clone()?,
        client,
        TypeRegistry::new(),
        ConnConfig::default(),
    );

    let greeter = connection.wait_for_object("greeter@1", Duration::from_secs(5))?;
    eprintln!(
        "driver announced {:?} with initializer {}",
        greeter.core().type_name(),
        greeter.core().initializer()
    );

    greeter.core().on("greeted", |params| {
        eprintln!("event: greeted, total so far {}", params["total"]);
    });

    for name in ["world", "pilotwire"] {
        let result = greeter
            .core()
            .channel()
            .call("greet", serde_json::json!({"name": name}))?;
        let value = pilotwire::conn::parse_result(&connection, &result)?;
        eprintln!("driver said {value:?}");
    }

    greeter.core().channel().call("quit", serde_json::json!({}))?;
    connection.wait_until_closed();
    assert!(greeter.core().is_disposed());
    eprintln!("greeter disposed, connection {:?}", connection.phase());

    let _ = driver_thread.join();
    Ok(())
}

/// The driver half of the conversation, speaking raw frames.
#[cfg(unix)]
fn run_driver(socket: std::os::unix::net::UnixStream) -> Result<(), Box<dyn std::error::Error>> {
    use pilotwire::frame::{FrameReader, FrameWriter};
    use serde_json::json;

    let mut reader = FrameReader::new(socket.try_clone()?);
    let mut writer = FrameWriter::new(socket);
    let mut send = |value: serde_json::Value| -> Result<(), Box<dyn std::error::Error>> {
        writer.send(&serde_json::to_vec(&value)?)?;
        Ok(())
    };

    send(json!({
        "guid": "greeter@1",
        "type": "Greeter",
        "initializer": {"language": "en"},
        "parentGuid": ""
    }))?;

    let mut greetings = 0u32;
    loop {
        let call: serde_json::Value = serde_json::from_slice(&reader.read_frame()?)?;
        let id = &call["id"];
        match call["method"].as_str() {
            Some("greet") => {
                greetings += 1;
                let name = call["params"]["name"].as_str().unwrap_or("stranger");
                send(json!({"id": id, "result": {"s": format!("hello, {name}")}}))?;
                send(json!({
                    "guid": "greeter@1",
                    "method": "greeted",
                    "params": {"total": greetings}
                }))?;
            }
            _ => {
                send(json!({"id": id, "result": null}))?;
                send(json!({"guid": "greeter@1"}))?;
                return Ok(());
            }
        }
    }
}

#[cfg(not(unix))]
fn main() {
    eprintln!("this example needs unix sockets");
}
