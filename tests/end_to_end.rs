//! End-to-end test against a minimal fake debuggee: exercises the
//! transport, correlator, dispatcher, and state model together the way a
//! real connection would, without touching the REPL's stdin loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use pydevc::client::{Client, NewBreakpoint};
use pydevc::codec;
use pydevc::events::NullEvents;

async fn read_frame(sock: &mut tokio::net::TcpStream) -> codec::Frame {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        sock.read_exact(&mut byte).await.unwrap();
        if byte[0] == b'\n' {
            break;
        }
        buf.push(byte[0]);
    }
    codec::decode(&String::from_utf8(buf).unwrap()).unwrap()
}

#[tokio::test]
async fn handshake_breakpoint_and_suspend_flow() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let fake_debuggee = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();

        // init handshake: reply with a version string.
        let init = read_frame(&mut sock).await;
        let reply = codec::encode(501, init.id, &[codec::quote_twice("1.0")]);
        sock.write_all(reply.as_bytes()).await.unwrap();

        // set_break: no reply expected on the wire, just consume it.
        let _set_break = read_frame(&mut sock).await;

        // Announce a thread, then suspend it at the breakpoint we just set.
        let create_payload =
            codec::quote_twice(r#"<xml><thread name="MainThread" id="pid_99_tid_1" /></xml>"#);
        sock.write_all(codec::encode(103, 2, &[create_payload]).as_bytes())
            .await
            .unwrap();

        let suspend_xml = r#"<xml><thread id="pid_99_tid_1" stop_reason="111">
            <frame id="0" name="<module>" file="prog.py" line="5"/>
        </thread></xml>"#;
        let suspend_payload = codec::quote_twice(suspend_xml);
        sock.write_all(codec::encode(105, 4, &[suspend_payload]).as_bytes())
            .await
            .unwrap();

        // The client should clean up its temporary breakpoint on its own;
        // read that frame to prove it was actually sent.
        let remove = read_frame(&mut sock).await;
        assert_eq!(remove.cmd, 112);

        // evaluate request/reply.
        let eval = read_frame(&mut sock).await;
        let eval_reply = codec::encode(
            113,
            eval.id,
            &[codec::quote_twice(r#"<xml><var value="42" /></xml>"#)],
        );
        sock.write_all(eval_reply.as_bytes()).await.unwrap();
    });

    let client = Client::connect(&addr.to_string(), Duration::from_secs(2), Arc::new(NullEvents))
        .await
        .unwrap();

    let version = client.init().await.unwrap();
    assert_eq!(version, "1.0");

    client
        .add_breakpoint(NewBreakpoint {
            filename: "prog.py".into(),
            line: 5,
            condition: None,
            expression: None,
            temporary: true,
        })
        .await
        .unwrap();

    // Give the background receive task a moment to process the thread
    // create/suspend events and the resulting breakpoint cleanup.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let threads = client.state().visible_threads();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].name, "MainThread");
    assert_eq!(threads[0].file.as_deref(), Some("prog.py"));

    let result = client.evaluate(None, "40 + 2").await.unwrap();
    assert_eq!(result, "42");

    fake_debuggee.await.unwrap();
}

#[tokio::test]
async fn start_debugger_lists_threads_before_run_and_learns_pid() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let fake_debuggee = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();

        let list_threads = read_frame(&mut sock).await;
        assert_eq!(list_threads.cmd, 102);
        let thread_payload =
            codec::quote_twice(r#"<xml><thread name="MainThread" id="pid_777_tid_1" /></xml>"#);
        let reply = codec::encode(102, list_threads.id, &[thread_payload]);
        sock.write_all(reply.as_bytes()).await.unwrap();

        // RUN carries no reply; just confirm it arrives after the listing.
        let run = read_frame(&mut sock).await;
        assert_eq!(run.cmd, 101);
    });

    let client = Client::connect(&addr.to_string(), Duration::from_secs(2), Arc::new(NullEvents))
        .await
        .unwrap();

    client.start_debugger().await.unwrap();
    fake_debuggee.await.unwrap();

    assert_eq!(client.state().pid(), Some(777));
}
