//! Frame server: one tokio task and one `Session` per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};

use crate::catalog::Catalog;
use crate::protocol::{self, ClientMessage, MessageStream, ServerMessage};
use crate::session::Session;

/// Accepts connections forever.
pub async fn run(listen_addr: &str, catalog: Arc<Catalog>) -> Result<()> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    log::info!("listening on {}", listener.local_addr()?);
    serve(listener, catalog).await
}

pub async fn serve(listener: TcpListener, catalog: Arc<Catalog>) -> Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        log::info!("client connected: {}", addr);
        let catalog = Arc::clone(&catalog);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, catalog).await {
                log::warn!("{}: {:#}", addr, e);
            }
            log::info!("client disconnected: {}", addr);
        });
    }
}

pub async fn handle_connection(socket: TcpStream, catalog: Arc<Catalog>) -> Result<()> {
    let peer: Option<SocketAddr> = socket.peer_addr().ok();
    let mut stream = protocol::message_stream(socket);
    let mut session: Option<Session> = None;

    while let Some(msg) = protocol::try_recv_message::<ClientMessage>(&mut stream).await? {
        match msg {
            ClientMessage::StartSession { exercise } => {
                match catalog.get(&exercise).and_then(Session::new) {
                    Ok(s) => {
                        if session.replace(s).is_some() {
                            log::info!("{:?}: previous session replaced", peer);
                        }
                        reply(&mut stream, ServerMessage::SessionStarted { exercise }).await?;
                    }
                    Err(e) => {
                        reply(&mut stream, ServerMessage::Error { message: e.to_string() }).await?;
                    }
                }
            }
            ClientMessage::Frame { frame } => match session.as_mut() {
                Some(s) => {
                    let result = s.ingest_frame(&frame);
                    reply(&mut stream, ServerMessage::FrameResult { result }).await?;
                }
                None => {
                    reply(&mut stream, no_session()).await?;
                }
            },
            ClientMessage::EndSession => match session.take() {
                Some(s) => {
                    let summary = s.summary();
                    log::info!(
                        "{:?}: session ended ({} reps, {:.1}s)",
                        peer,
                        summary.total_reps,
                        summary.duration_seconds
                    );
                    reply(&mut stream, ServerMessage::Summary { summary }).await?;
                }
                None => {
                    reply(&mut stream, no_session()).await?;
                }
            },
        }
    }
    Ok(())
}

fn no_session() -> ServerMessage {
    ServerMessage::Error {
        message: "no active session".to_string(),
    }
}

async fn reply(stream: &mut MessageStream, msg: ServerMessage) -> Result<()> {
    protocol::send_message(stream, &msg).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Landmark, LandmarkIndex, PoseFrame};
    use crate::protocol::{message_stream, recv_message, send_message};

    fn standing(t: f64) -> PoseFrame {
        let mut landmarks = vec![Landmark::new(0.5, 0.5, 0.0, 0.9); LandmarkIndex::COUNT];
        for (hip, knee, ankle, x) in [
            (LandmarkIndex::LeftHip, LandmarkIndex::LeftKnee, LandmarkIndex::LeftAnkle, 0.45),
            (LandmarkIndex::RightHip, LandmarkIndex::RightKnee, LandmarkIndex::RightAnkle, 0.55),
        ] {
            landmarks[hip as usize] = Landmark::new(x, 0.4, 0.0, 0.9);
            landmarks[knee as usize] = Landmark::new(x, 0.6, 0.0, 0.9);
            landmarks[ankle as usize] = Landmark::new(x, 0.8, 0.0, 0.9);
        }
        PoseFrame::new(t, landmarks)
    }

    async fn connect() -> MessageStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::new(Catalog::builtin())));
        message_stream(TcpStream::connect(addr).await.unwrap())
    }

    async fn exchange(stream: &mut MessageStream, msg: ClientMessage) -> ServerMessage {
        send_message(stream, &msg).await.unwrap();
        recv_message(stream).await.unwrap()
    }

    #[tokio::test]
    async fn test_session_over_tcp() {
        let mut client = connect().await;

        let started = exchange(&mut client, ClientMessage::StartSession { exercise: "squat".to_string() }).await;
        assert_eq!(started, ServerMessage::SessionStarted { exercise: "squat".to_string() });

        for i in 0..3 {
            let reply = exchange(&mut client, ClientMessage::Frame { frame: standing(i as f64 * 0.1) }).await;
            match reply {
                ServerMessage::FrameResult { result } => {
                    assert_eq!(result.stage, "up");
                    assert_eq!(result.current_rep, 0);
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        match exchange(&mut client, ClientMessage::EndSession).await {
            ServerMessage::Summary { summary } => {
                assert_eq!(summary.exercise_type, "squat");
                assert_eq!(summary.total_reps, 0);
                assert!((summary.duration_seconds - 0.2).abs() < 1e-9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_errors_keep_connection_open() {
        let mut client = connect().await;

        let reply = exchange(&mut client, ClientMessage::Frame { frame: standing(0.0) }).await;
        assert!(matches!(reply, ServerMessage::Error { .. }));

        let reply = exchange(&mut client, ClientMessage::StartSession { exercise: "burpee".to_string() }).await;
        match reply {
            ServerMessage::Error { message } => assert!(message.contains("burpee")),
            other => panic!("unexpected {:?}", other),
        }

        let reply = exchange(&mut client, ClientMessage::StartSession { exercise: "push_up".to_string() }).await;
        assert!(matches!(reply, ServerMessage::SessionStarted { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_independent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::new(Catalog::builtin())));

        let mut a = message_stream(TcpStream::connect(addr).await.unwrap());
        let mut b = message_stream(TcpStream::connect(addr).await.unwrap());
        exchange(&mut a, ClientMessage::StartSession { exercise: "squat".to_string() }).await;
        exchange(&mut b, ClientMessage::StartSession { exercise: "breathing_exercise".to_string() }).await;

        exchange(&mut a, ClientMessage::Frame { frame: standing(5.0) }).await;
        // b は a のタイムスタンプに影響されない
        match exchange(&mut b, ClientMessage::Frame { frame: standing(0.0) }).await {
            ServerMessage::FrameResult { result } => assert_eq!(result.stage, "inhale"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
