//! A loopback HTTP server answering with canned responses
#![allow(clippy::unwrap_used)]

use tokio::{
	io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
	net::TcpListener,
	task::JoinHandle,
};
use url::Url;

/// A request as received by [`serve`]
#[derive(Debug)]
pub(crate) struct Request {
	/// Method and path, e.g. "GET /issues/7.json"
	pub line: String,
	/// Headers with lowercase names
	pub headers: Vec<(String, String)>,
	/// The decoded body
	pub body: String,
}

impl Request {
	/// The value of a header
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	}
}

/// Answer one connection per canned `(status, body)` pair, in order, and
/// close it afterwards. The handle yields the requests received.
pub(crate) async fn serve(responses: Vec<(u16, &'static str)>) -> (Url, JoinHandle<Vec<Request>>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
	let handle = tokio::spawn(async move {
		let mut requests = Vec::new();
		for (status, body) in responses {
			let (stream, _) = listener.accept().await.unwrap();
			let mut stream = BufReader::new(stream);

			let mut line = String::new();
			stream.read_line(&mut line).await.unwrap();
			let line = line.trim_end().trim_end_matches("HTTP/1.1").trim_end().to_owned();

			let mut headers = Vec::new();
			loop {
				let mut header = String::new();
				stream.read_line(&mut header).await.unwrap();
				let Some((name, value)) = header.trim_end().split_once(':') else {
					break;
				};
				headers.push((name.to_lowercase(), value.trim().to_owned()));
			}
			let length = headers
				.iter()
				.find(|(name, _)| name == "content-length")
				.map_or(0, |(_, value)| value.parse().unwrap());
			let mut content = vec![0; length];
			stream.read_exact(&mut content).await.unwrap();
			requests.push(Request { line, headers, body: String::from_utf8(content).unwrap() });

			let response = format!(
				"HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\n\
				 content-length: {}\r\nconnection: close\r\n\r\n{body}",
				body.len()
			);
			stream.get_mut().write_all(response.as_bytes()).await.unwrap();
			stream.get_mut().shutdown().await.unwrap();
		}
		requests
	});
	(url, handle)
}
