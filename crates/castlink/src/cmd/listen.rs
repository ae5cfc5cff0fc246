use bytes::Bytes;
use castlink::socket::{
    BoxError, ConnectionChannel, HeartbeatChannel, IntervalHeartbeat, NoopChannel, StaticHandshake,
};
use castlink::PluginConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{socket_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub async fn run(args: ListenArgs, config: &PluginConfig, format: OutputFormat) -> CliResult<i32> {
    let host = args.connect.resolve_host(config)?;
    let service = args.connect.service()?;
    let token = CancellationToken::new();

    let handshake: Box<dyn ConnectionChannel> = if args.handshake_data.is_empty() {
        Box::new(NoopChannel)
    } else {
        let frames = args
            .handshake_data
            .iter()
            .map(|data| Bytes::copy_from_slice(data.as_bytes()))
            .collect();
        Box::new(StaticHandshake::new(service.writer(), frames))
    };
    let heartbeat: Box<dyn HeartbeatChannel> = match &args.heartbeat_interval {
        Some(interval) => Box::new(IntervalHeartbeat::new(
            service.writer(),
            parse_duration(interval)?,
            Bytes::copy_from_slice(args.heartbeat_data.as_bytes()),
        )),
        None => Box::new(NoopChannel),
    };

    let (tx, mut frames) = mpsc::unbounded_channel::<Bytes>();
    let handler = move |payload: Bytes, _is_binary: bool, _token: CancellationToken| {
        std::future::ready(tx.send(payload).map_err(BoxError::from))
    };

    let connect = service.connect(
        &host,
        args.connect.port,
        &*handshake,
        &*heartbeat,
        handler,
        &token,
    );
    tokio::select! {
        result = connect => result.map_err(|err| socket_error("connect failed", err))?,
        _ = tokio::signal::ctrl_c() => {
            token.cancel();
            return Err(socket_error("connect failed", castlink::SocketError::Cancelled));
        }
    }
    info!(host = %host, port = args.connect.port, "listening");

    let mut received = 0u64;
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    received += 1;
                    print_frame(&frame, &args.connect.target, received, format);
                    if args.count.is_some_and(|count| received >= count) {
                        break;
                    }
                }
                None => {
                    info!(received, "device closed the connection");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!(received, "interrupted");
                break;
            }
        }
    }

    service
        .disconnect(&token)
        .await
        .map_err(|err| socket_error("listen failed", err))?;
    Ok(SUCCESS)
}
