use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::BytesMut;
use renvim_protocol::{Message, Notification, Request, Response, Value, encode_message, read_message};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf, duplex};
use tokio::sync::mpsc;

use super::*;
use crate::transport::TransportParts;

/// Host end of an in-memory control channel.
struct FakeHost {
	reader: ReadHalf<DuplexStream>,
	writer: WriteHalf<DuplexStream>,
	buf: BytesMut,
}

impl FakeHost {
	async fn next_request(&mut self) -> Request {
		match read_message(&mut self.reader, &mut self.buf).await.unwrap() {
			Message::Request(request) => request,
			other => panic!("expected request, got {other:?}"),
		}
	}

	async fn next_message(&mut self) -> Message {
		read_message(&mut self.reader, &mut self.buf).await.unwrap()
	}

	async fn send(&mut self, message: Message) {
		let mut frame = BytesMut::new();
		encode_message(&mut frame, &message).unwrap();
		self.writer.write_all(&frame).await.unwrap();
		self.writer.flush().await.unwrap();
	}

	async fn reply(&mut self, id: u32, result: Value) {
		self.send(Message::Response(Response::ok(id, result))).await;
	}
}

fn create_test_connection() -> (Arc<Connection>, FakeHost) {
	let (client_side, host_side) = duplex(64 * 1024);
	let connection = Connection::spawn(TransportParts::from_stream(client_side));
	let (reader, writer) = tokio::io::split(host_side);
	(
		connection,
		FakeHost {
			reader,
			writer,
			buf: BytesMut::new(),
		},
	)
}

#[tokio::test]
async fn test_request_id_increments() {
	let (connection, _host) = create_test_connection();

	let id1 = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let id2 = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let id3 = connection.last_id.fetch_add(1, Ordering::SeqCst);

	assert_eq!(id1, 0);
	assert_eq!(id2, 1);
	assert_eq!(id3, 2);
}

#[tokio::test]
async fn test_call_receives_matching_response() {
	let (connection, mut host) = create_test_connection();

	let call = tokio::spawn({
		let connection = Arc::clone(&connection);
		async move { connection.call("nvim_command", vec![Value::from("tabnew")]).await }
	});

	let request = host.next_request().await;
	assert_eq!(request.method, "nvim_command");
	assert_eq!(request.args, vec![Value::from("tabnew")]);
	host.reply(request.id, Value::Nil).await;

	assert_eq!(call.await.unwrap().unwrap(), Value::Nil);
}

#[tokio::test]
async fn test_remote_error_carries_method_and_message() {
	let (connection, mut host) = create_test_connection();

	let call = tokio::spawn({
		let connection = Arc::clone(&connection);
		async move { connection.call("nvim_command", vec![Value::from("tabnew ::")]).await }
	});

	let request = host.next_request().await;
	host.send(Message::Response(Response {
		id: request.id,
		error: Value::Array(vec![Value::from(0), Value::from("E492: Not an editor command")]),
		result: Value::Nil,
	}))
	.await;

	let err = call.await.unwrap().unwrap_err();
	assert!(!err.is_fatal());
	assert_eq!(err.remote_message(), Some("E492: Not an editor command"));
	match err {
		Error::Remote { method, .. } => assert_eq!(method, "nvim_command"),
		other => panic!("Expected Remote error, got {other:?}"),
	}
}

#[tokio::test]
async fn test_calls_are_serialized() {
	let (connection, mut host) = create_test_connection();

	let first = tokio::spawn({
		let connection = Arc::clone(&connection);
		async move { connection.call("first", Vec::new()).await }
	});
	let first_request = host.next_request().await;
	assert_eq!(first_request.method, "first");

	let second = tokio::spawn({
		let connection = Arc::clone(&connection);
		async move { connection.call("second", Vec::new()).await }
	});

	// Nothing else may reach the wire until the first response is delivered.
	let early = tokio::time::timeout(Duration::from_millis(50), host.next_message()).await;
	assert!(early.is_err(), "second request written while first in flight");

	host.reply(first_request.id, Value::from(1)).await;
	assert_eq!(first.await.unwrap().unwrap(), Value::from(1));

	let second_request = host.next_request().await;
	assert_eq!(second_request.method, "second");
	assert_ne!(second_request.id, first_request.id);
	host.reply(second_request.id, Value::from(2)).await;
	assert_eq!(second.await.unwrap().unwrap(), Value::from(2));
}

#[tokio::test]
async fn test_notification_routed_to_handler() {
	let (connection, mut host) = create_test_connection();

	let (tx, mut rx) = mpsc::unbounded_channel();
	connection.register_handler(
		"renvimExit",
		Arc::new(move |params| {
			let _ = tx.send(params);
		}),
	);

	host.send(Message::Notification(Notification {
		method: "somethingElse".to_string(),
		params: vec![Value::from(1)],
	}))
	.await;
	host.send(Message::Notification(Notification {
		method: "renvimExit".to_string(),
		params: vec![Value::from(5)],
	}))
	.await;

	assert_eq!(rx.recv().await.unwrap(), vec![Value::from(5)]);
	assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unregistered_handler_receives_nothing() {
	let (connection, mut host) = create_test_connection();

	let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Value>>();
	connection.register_handler(
		"renvimExit",
		Arc::new(move |params| {
			let _ = tx.send(params);
		}),
	);
	connection.unregister_handler("renvimExit");

	host.send(Message::Notification(Notification {
		method: "renvimExit".to_string(),
		params: vec![Value::from(5)],
	}))
	.await;

	// The handler (and its sender) was dropped on unregister.
	assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_host_close_fails_pending_call() {
	let (connection, mut host) = create_test_connection();

	let call = tokio::spawn({
		let connection = Arc::clone(&connection);
		async move { connection.call("nvim_get_current_buf", Vec::new()).await }
	});
	host.next_request().await;
	drop(host);

	let err = call.await.unwrap().unwrap_err();
	assert!(matches!(err, Error::ChannelClosed), "{err:?}");
	assert!(err.is_fatal());

	connection.closed().await;
	assert!(connection.is_closed());
	let err = connection.call("nvim_command", Vec::new()).await.unwrap_err();
	assert!(err.is_fatal());
}

#[tokio::test]
async fn test_close_drops_handlers() {
	let (connection, host) = create_test_connection();

	let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Value>>();
	connection.register_handler(
		"renvimExit",
		Arc::new(move |params| {
			let _ = tx.send(params);
		}),
	);
	drop(host);

	connection.closed().await;
	assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_malformed_envelope_is_protocol_error() {
	let (connection, mut host) = create_test_connection();

	let call = tokio::spawn({
		let connection = Arc::clone(&connection);
		async move { connection.call("nvim_command", Vec::new()).await }
	});
	host.next_request().await;

	// A response envelope with three elements.
	let mut frame = Vec::new();
	let envelope = Value::Array(vec![Value::from(1), Value::from(0), Value::Nil]);
	rmpv::encode::write_value(&mut frame, &envelope).unwrap();
	host.writer.write_all(&frame).await.unwrap();
	host.writer.flush().await.unwrap();

	let err = call.await.unwrap().unwrap_err();
	assert!(matches!(err, Error::Protocol(_)), "{err:?}");
}

#[tokio::test]
async fn test_host_request_is_refused() {
	let (_connection, mut host) = create_test_connection();

	host.send(Message::Request(Request {
		id: 99,
		method: "renvim_anything".to_string(),
		args: Vec::new(),
	}))
	.await;

	match host.next_message().await {
		Message::Response(response) => {
			assert_eq!(response.id, 99);
			assert!(response.result.is_nil());
			assert!(!response.error.is_nil());
		}
		other => panic!("Expected Response, got {other:?}"),
	}
}

#[tokio::test]
async fn test_channel_id_is_cached() {
	let (connection, mut host) = create_test_connection();

	let lookup = tokio::spawn({
		let connection = Arc::clone(&connection);
		async move { connection.channel_id().await }
	});

	let request = host.next_request().await;
	assert_eq!(request.method, "nvim_get_api_info");
	host.reply(
		request.id,
		Value::Array(vec![Value::from(7), Value::Map(Vec::new())]),
	)
	.await;
	assert_eq!(lookup.await.unwrap().unwrap(), 7);

	// Answered from the cache; the host sees no second request.
	assert_eq!(connection.channel_id().await.unwrap(), 7);
}

#[tokio::test]
async fn test_response_for_unknown_id_is_ignored() {
	let (connection, _host) = create_test_connection();

	connection.dispatch(Message::Response(Response::ok(12345, Value::Nil)));
	assert!(connection.pending.lock().calls.is_empty());
	assert!(!connection.is_closed());
}
