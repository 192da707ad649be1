//! Stream routes served over an in-memory socket.

use std::sync::Arc;
use std::time::Duration;

use dyne_auth::{AuthGate, TokenAuth};
use dyne_core::{BoxFuture, Request, Response, User};
use dyne_server::{
    stream_handler, Dispatcher, HookOutcome, Registry, Route, StreamAccept, StreamHook, StreamSession,
};
use futures_util::{SinkExt, StreamExt};
use http::{Method, StatusCode};
use tokio::io::DuplexStream;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

fn upgrade(path: &str) -> Request {
    Request::new(Method::GET, path.parse().unwrap())
}

/// Runs `accept` on one end of a duplex pipe and returns the client end.
async fn connect(accept: StreamAccept, shutdown: CancellationToken) -> (WebSocketStream<DuplexStream>, tokio::task::JoinHandle<()>) {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let task = tokio::spawn(async move {
        let ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        accept.run(ws, &shutdown).await;
    });
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    (client, task)
}

fn echo_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(Route::stream(
            "/rooms/{room}",
            stream_handler(|mut session: StreamSession| async move {
                let room = session.params().get_str("room").unwrap_or_default().to_string();
                while let Some(msg) = session.recv().await {
                    let reply = format!("{room}: {}", msg.as_text().unwrap_or("<binary>"));
                    if session.send_text(reply).await.is_err() {
                        break;
                    }
                }
            }),
        ))
        .unwrap();
    registry
}

#[tokio::test]
async fn test_stream_echoes_until_client_closes() {
    let dispatcher = Dispatcher::new(echo_registry());
    let accept = dispatcher.accept_stream(upgrade("/rooms/lobby")).await.unwrap();
    let (mut client, task) = connect(accept, CancellationToken::new()).await;

    client.send(WsMessage::text("hi")).await.unwrap();
    let reply = client.next().await.unwrap().unwrap();
    assert_eq!(reply.to_text().unwrap(), "lobby: hi");

    client.close(None).await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_open_streams() {
    let dispatcher = Dispatcher::new(echo_registry());
    let accept = dispatcher.accept_stream(upgrade("/rooms/a")).await.unwrap();
    let shutdown = CancellationToken::new();
    let (mut client, task) = connect(accept, shutdown.clone()).await;

    shutdown.cancel();
    task.await.unwrap();
    // The server's close frame, or the end of the socket.
    match client.next().await {
        Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => {}
        Some(Ok(other)) => panic!("unexpected message {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_routes_do_not_answer_http() {
    let dispatcher = Dispatcher::new(echo_registry());

    let resp = dispatcher.dispatch(upgrade("/rooms/lobby")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let refused = dispatcher.accept_stream(upgrade("/nowhere")).await.unwrap_err();
    assert_eq!(refused.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gated_stream_refuses_before_upgrade() {
    let mut registry = Registry::new();
    let gate = AuthGate::new(Arc::new(
        TokenAuth::new().verify(|token| async move { (token == "t0k").then(|| User::new("alice")) }),
    ));
    registry
        .register(
            Route::stream(
                "/feed",
                stream_handler(|session: StreamSession| async move {
                    let name = session.user().and_then(User::name).unwrap_or_default().to_string();
                    let _ = session.send_text(name).await;
                }),
            )
            .auth(gate),
        )
        .unwrap();
    let dispatcher = Dispatcher::new(registry);

    let refused = dispatcher.accept_stream(upgrade("/feed")).await.unwrap_err();
    assert_eq!(refused.status(), StatusCode::UNAUTHORIZED);

    let accept = dispatcher
        .accept_stream(upgrade("/feed").with_header("authorization", "Bearer t0k"))
        .await
        .unwrap();
    let (mut client, task) = connect(accept, CancellationToken::new()).await;
    let greeting = client.next().await.unwrap().unwrap();
    assert_eq!(greeting.to_text().unwrap(), "alice");
    task.await.unwrap();
}

/// Turns away clients that ask to be turned away, and tags the rest.
struct Doorman;

impl StreamHook for Doorman {
    fn before<'a>(&'a self, req: &'a mut Request, resp: &'a mut Response) -> BoxFuture<'a, HookOutcome> {
        Box::pin(async move {
            if req.header("x-go-away").is_some() {
                resp.set_status(StatusCode::FORBIDDEN);
                return HookOutcome::Respond;
            }
            req.state_mut().insert(Greeting("welcome"));
            HookOutcome::Continue
        })
    }
}

struct Greeting(&'static str);

#[tokio::test]
async fn test_stream_hook_runs_before_gate_and_upgrade() {
    let mut registry = Registry::new();
    let gate = AuthGate::new(Arc::new(
        TokenAuth::new().verify(|token| async move { (token == "t0k").then(|| User::new("alice")) }),
    ));
    registry
        .register(
            Route::stream(
                "/lounge",
                stream_handler(|session: StreamSession| async move {
                    let greeting = session.state().get::<Greeting>().map_or("none", |g| g.0);
                    let _ = session.send_text(greeting).await;
                }),
            )
            .auth(gate),
        )
        .unwrap();
    registry.before_stream(Doorman);
    let dispatcher = Dispatcher::new(registry);

    // The hook answers before the gate would ask for credentials.
    let refused = dispatcher
        .accept_stream(upgrade("/lounge").with_header("x-go-away", "1"))
        .await
        .unwrap_err();
    assert_eq!(refused.status(), StatusCode::FORBIDDEN);

    let refused = dispatcher.accept_stream(upgrade("/lounge")).await.unwrap_err();
    assert_eq!(refused.status(), StatusCode::UNAUTHORIZED);

    let accept = dispatcher
        .accept_stream(upgrade("/lounge").with_header("authorization", "Bearer t0k"))
        .await
        .unwrap();
    let (mut client, task) = connect(accept, CancellationToken::new()).await;
    assert_eq!(client.next().await.unwrap().unwrap().to_text().unwrap(), "welcome");
    task.await.unwrap();
}

#[tokio::test]
async fn test_closure_stream_hook_runs_in_order() {
    let mut registry = echo_registry();
    registry
        .before_stream(|req: &mut Request, _resp: &mut Response| {
            req.state_mut().insert(Greeting("first"));
            HookOutcome::Continue
        })
        .before_stream(|req: &mut Request, resp: &mut Response| {
            if req.state().get::<Greeting>().is_some() {
                resp.set_status(StatusCode::IM_A_TEAPOT);
            }
            HookOutcome::Respond
        });
    let refused = Dispatcher::new(registry)
        .accept_stream(upgrade("/rooms/x"))
        .await
        .unwrap_err();
    assert_eq!(refused.status(), StatusCode::IM_A_TEAPOT);
}

#[tokio::test]
async fn test_shutdown_ends_stream_with_stalled_reader() {
    let mut registry = Registry::new();
    registry
        .register(Route::stream(
            "/firehose",
            stream_handler(|session: StreamSession| async move {
                let chunk = "x".repeat(64 * 1024);
                for _ in 0..64 {
                    if session.send_text(chunk.clone()).await.is_err() {
                        break;
                    }
                }
            }),
        ))
        .unwrap();
    let dispatcher = Dispatcher::new(registry);
    let accept = dispatcher.accept_stream(upgrade("/firehose")).await.unwrap();
    let shutdown = CancellationToken::new();
    // The client never reads, so the server's writes back up.
    let (_client, task) = connect(accept, shutdown.clone()).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!task.is_finished());
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("stream task outlived shutdown")
        .unwrap();
}
