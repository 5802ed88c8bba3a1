use chatroom_core::proto::{FILE_DESCRIPTOR_SET, chat_service_server::ChatServiceServer};
use chatroom_server::server::{
    config::{CliArgs, ServerConfig},
    service::handler::ChatServer,
    telemetry::{TelemetryProviders, init_telemetry},
};
use clap::Parser;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

type ChatService = ChatServiceServer<ChatServer>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = ServerConfig::try_from(CliArgs::parse())?;
    let providers = init_telemetry()?;

    tracing::info!(
        addr = %config.server_addr,
        uds = config.uds,
        sink_buffer_size = config.sink_buffer_size,
        send_timeout = ?config.send_timeout,
        "Starting chat server"
    );

    if !config.uds {
        let listener = TcpListener::bind(&config.server_addr).await?;
        return serve(TcpListenerStream::new(listener), config, providers).await;
    }

    #[cfg(unix)]
    {
        use tokio::net::UnixListener;
        use tokio_stream::wrappers::UnixListenerStream;

        let path = config.server_addr.clone();
        let listener = UnixListener::bind(&path)?;
        let res = serve(UnixListenerStream::new(listener), config, providers).await;
        let _ = std::fs::remove_file(&path);
        res
    }
    #[cfg(not(unix))]
    {
        anyhow::bail!("Unix domain sockets are not supported on this platform")
    }
}

async fn serve<I, IO, IE>(
    incoming: I,
    config: ServerConfig,
    providers: TelemetryProviders,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter.set_serving::<ChatService>().await;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let chat = ChatServer::new(config);
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(ServiceBuilder::new().layer(cors).layer(GrpcWebLayer::new()))
        .add_service(health_service)
        .add_service(reflection)
        .add_service(compressed(chat.clone()))
        .serve_with_incoming_shutdown(incoming, drain_on_signal(chat, health_reporter, providers))
        .await?;

    tracing::info!("Chat server stopped");
    Ok(())
}

fn compressed(chat: ChatServer) -> ChatService {
    [
        CompressionEncoding::Zstd,
        CompressionEncoding::Gzip,
        CompressionEncoding::Deflate,
    ]
    .into_iter()
    .fold(ChatServiceServer::new(chat), |svc, encoding| {
        svc.send_compressed(encoding).accept_compressed(encoding)
    })
}

/// Resolves on SIGINT or SIGTERM with the signal's name.
async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        res = signal::ctrl_c() => {
            res.expect("failed to install Ctrl+C handler");
            "SIGINT"
        }
        () = terminate => "SIGTERM",
    }
}

async fn drain_on_signal(
    chat: ChatServer,
    health_reporter: HealthReporter,
    providers: TelemetryProviders,
) {
    let name = wait_for_signal().await;
    tracing::info!(signal = name, "Shutting down");

    health_reporter.set_not_serving::<ChatService>().await;

    // Ending every chat stream lets the transport finish its graceful drain.
    if let Err(e) = chat.shutdown().await {
        tracing::error!("Error while closing chat sessions: {e:?}");
    }

    providers.shutdown();
}
