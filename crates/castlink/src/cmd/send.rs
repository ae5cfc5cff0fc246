use std::fs;

use bytes::Bytes;
use castlink::socket::{BoxError, NoopChannel};
use castlink::PluginConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, socket_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_frame, OutputFormat};

pub async fn run(args: SendArgs, config: &PluginConfig, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;
    let host = args.connect.resolve_host(config)?;
    let service = args.connect.service()?;
    let token = CancellationToken::new();

    let (tx, mut frames) = mpsc::unbounded_channel::<Bytes>();
    let handler = move |payload: Bytes, _is_binary: bool, _token: CancellationToken| {
        std::future::ready(tx.send(payload).map_err(BoxError::from))
    };

    service
        .connect(
            &host,
            args.connect.port,
            &NoopChannel,
            &NoopChannel,
            handler,
            &token,
        )
        .await
        .map_err(|err| socket_error("connect failed", err))?;

    if let Err(err) = service.send_frame(&payload, &token).await {
        if let Err(teardown) = service.disconnect(&token).await {
            debug!(error = %teardown, "disconnect after failed send");
        }
        return Err(socket_error("send failed", err));
    }
    debug!(len = payload.len(), host = %host, "payload sent");

    let mut outcome = Ok(SUCCESS);
    if args.wait {
        outcome = match tokio::time::timeout(wait_timeout, frames.recv()).await {
            Ok(Some(frame)) => {
                print_frame(&frame, &args.connect.target, 1, format);
                Ok(SUCCESS)
            }
            // The pump ended before anything arrived; disconnect reports why.
            Ok(None) => Err(CliError::new(
                FAILURE,
                "connection closed before a frame arrived",
            )),
            Err(_) => Err(CliError::new(
                TIMEOUT,
                format!("no frame received within {wait_timeout:?}"),
            )),
        };
    }

    let closed = service
        .disconnect(&token)
        .await
        .map_err(|err| socket_error("disconnect failed", err));
    match (outcome, closed) {
        (Err(err), Err(cause)) if err.code == FAILURE => Err(cause),
        (outcome, closed) => outcome.and_then(|code| closed.map(|()| code)),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(hex) = &args.hex {
        return decode_hex(hex);
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Err(CliError::new(USAGE, "one of --data, --hex or --file is required"))
}

fn decode_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "--hex needs an even number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).unwrap_or("");
            u8::from_str_radix(text, 16)
                .map_err(|_| CliError::new(USAGE, format!("--hex has invalid digits '{text}'")))
        })
        .collect()
}
