//! In-process fullnode stand-in for tests.

use std::sync::{Arc, Mutex};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use crate::{
    config::{ClientConfig, NetworkTarget},
    rpc::RemoteStateClient,
};

#[derive(Clone, Debug)]
pub struct Route {
    method: &'static str,
    path: String,
    body_contains: Option<String>,
    status: u16,
    response: String,
}

impl Route {
    pub fn new(method: &'static str, path: &str, status: u16, response: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            body_contains: None,
            status,
            response: response.to_string(),
        }
    }

    pub fn get(path: &str, response: &str) -> Self {
        Self::new("GET", path, 200, response)
    }

    /// A `POST /view` answer for the view function whose id contains `function`.
    pub fn view(function: &str, response: &str) -> Self {
        Self::new("POST", "/view", 200, response).when_body(&format!("::{function}\""))
    }

    pub fn when_body(mut self, needle: &str) -> Self {
        self.body_contains = Some(needle.to_string());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    fn matches(&self, request: &Recorded) -> bool {
        request.method == self.method
            && request.path.contains(&self.path)
            && self
                .body_contains
                .as_ref()
                .map_or(true, |needle| request.body.contains(needle.as_str()))
    }
}

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Serves canned responses, first matching route wins. Unmatched requests get
/// the node's generic 404, which is not a not-found record.
pub struct MockNode {
    pub url: String,
    routes: Arc<Mutex<Vec<Route>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockNode {
    pub async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(Mutex::new(routes));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (task_routes, task_requests) = (routes.clone(), requests.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = task_routes.clone();
                let requests = task_requests.clone();
                tokio::spawn(handle(stream, routes, requests));
            }
        });

        Self {
            url: format!("http://{addr}/v1"),
            routes,
            requests,
        }
    }

    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::testnet();
        config.network = NetworkTarget::Testnet {
            url: self.url.clone(),
        };
        config
    }

    pub fn client(&self) -> RemoteStateClient {
        RemoteStateClient::new(&self.config()).unwrap()
    }

    /// Puts `route` ahead of the existing ones.
    pub fn prepend(&self, route: Route) {
        self.routes.lock().unwrap().insert(0, route);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.contains(path))
            .collect()
    }
}

async fn handle(
    mut stream: TcpStream,
    routes: Arc<Mutex<Vec<Route>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    let route = routes
        .lock()
        .unwrap()
        .iter()
        .find(|route| route.matches(&request))
        .cloned();
    requests.lock().unwrap().push(request);

    let (status, body) = match route {
        Some(route) => (route.status, route.response),
        None => (404, r#"{"message":"no route","error_code":"web_framework_error"}"#.to_string()),
    };
    let response = format!(
        "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\n\
         content-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream) -> Option<Recorded> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&data).into_owned();
        let Some(end) = text.find("\r\n\r\n") else {
            continue;
        };
        let head = &text[..end];
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        if data.len() < end + 4 + length {
            continue;
        }

        let mut request_line = head.lines().next()?.split_whitespace();
        let method = request_line.next()?.to_string();
        let path = request_line.next()?.to_string();
        let body = String::from_utf8_lossy(&data[end + 4..end + 4 + length]).into_owned();
        return Some(Recorded { method, path, body });
    }
}
