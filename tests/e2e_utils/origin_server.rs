#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ServerBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// What the origin saw of one request.
#[derive(Debug, Clone)]
pub struct ObservedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Plain HTTP origin on an ephemeral port.
///
/// `/echo` answers 200 with the request body; every other path answers
/// 403 with the body `HELLO`.
pub struct TestOriginServer {
    addr: SocketAddr,
    observed: Arc<Mutex<Vec<ObservedRequest>>>,
    _server_handle: JoinHandle<()>,
}

impl TestOriginServer {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let observed: Arc<Mutex<Vec<ObservedRequest>>> = Arc::default();

        let recorder = observed.clone();
        let server_handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let io = TokioIo::new(stream);
                        let recorder = recorder.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req: Request<Incoming>| {
                                let recorder = recorder.clone();
                                async move { Self::respond(req, recorder).await }
                            });

                            if let Err(_err) = ServerBuilder::new(TokioExecutor::new())
                                .serve_connection(io, service)
                                .await
                            {
                                // Silently handle errors in test
                            }
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            addr,
            observed,
            _server_handle: server_handle,
        })
    }

    async fn respond(
        req: Request<Incoming>,
        recorder: Arc<Mutex<Vec<ObservedRequest>>>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let (parts, body) = req.into_parts();
        let body = body.collect().await?.to_bytes();
        let echo = parts.uri.path() == "/echo";

        recorder.lock().unwrap().push(ObservedRequest {
            method: parts.method,
            uri: parts.uri.to_string(),
            headers: parts.headers,
            body: body.clone(),
        });

        let mut response = if echo {
            Response::new(Full::new(body))
        } else {
            Response::new(Full::new(Bytes::from_static(b"HELLO")))
        };
        if !echo {
            *response.status_mut() = StatusCode::FORBIDDEN;
        }
        Ok(response)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn observed(&self) -> Vec<ObservedRequest> {
        self.observed.lock().unwrap().clone()
    }
}
