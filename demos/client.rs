use ws_sync::{client::connect_with_config, ClosedPolicy, Message, Outcome, WsConfig};

fn main() {
    env_logger::init();

    let config = WsConfig::default().closed_policy(ClosedPolicy::Sentinel);
    let (mut socket, response) =
        connect_with_config("ws://localhost:3012/socket", Some(config)).expect("Can't connect");

    println!("Connected to the server");
    println!("Response HTTP code: {}", response.status());
    println!("Response contains the following headers:");
    for (header, _value) in response.headers() {
        println!("* {header}");
    }

    socket.send_frame(Message::text("Hello WebSocket")).unwrap().done().unwrap();
    while let Outcome::Done(msg) = socket.recv_frame().expect("Error reading message") {
        println!("Received: {msg}");
    }
    println!("Server closed the connection: {:?}", socket.peer_close_frame());
}
