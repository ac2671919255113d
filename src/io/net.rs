use crate::error::{Result, StemError};
use log::warn;
use reqwest::blocking::Client;
use std::{io::Read, time::Duration};

/// Upper bound on buffer space reserved from an advertised Content-Length.
const MAX_PREALLOC: u64 = 256 * 1024 * 1024;

pub fn http_client() -> Result<Client> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60 * 60))
        .build()?;
    Ok(client)
}

/// Stream `url` into memory, reporting `(received, content_length)` after
/// every read.
pub fn fetch_with_progress(
    client: &Client,
    url: &str,
    on_progress: &mut dyn FnMut(u64, Option<u64>),
) -> Result<Vec<u8>> {
    let mut resp = client.get(url).send()?.error_for_status()?;

    let total = resp.content_length().filter(|&n| n > 0);
    on_progress(0, total);

    let mut body = Vec::with_capacity(initial_capacity(total));
    let mut received: u64 = 0;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = resp.read(&mut buf)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
        received += n as u64;
        on_progress(received, total);
    }

    Ok(body)
}

fn initial_capacity(total: Option<u64>) -> usize {
    total.unwrap_or(0).min(MAX_PREALLOC) as usize
}

/// Try each mirror in order; the first body that passes `accept` wins.
pub fn fetch_from_mirrors(
    client: &Client,
    mirrors: &[String],
    accept: &dyn Fn(&[u8]) -> Result<()>,
    on_progress: &mut dyn FnMut(u64, Option<u64>),
) -> Result<Vec<u8>> {
    let mut last = String::from("no mirrors configured");

    for url in mirrors {
        let attempt = fetch_with_progress(client, url, on_progress)
            .and_then(|body| accept(&body).map(|()| body));
        match attempt {
            Ok(body) => return Ok(body),
            Err(e) => {
                warn!("mirror {url} failed: {e}");
                last = format!("{url}: {e}");
            }
        }
    }

    Err(StemError::Download { last })
}
