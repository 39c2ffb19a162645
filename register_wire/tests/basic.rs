use register_wire::{register, Message, MessageBody, WireError};

#[test]
fn send_receive() {
    let mut tmp = Vec::new();

    let mut sender = register_wire::Sender::new(&mut tmp);

    let send = Message::new(
        "src",
        "dest",
        MessageBody::new(
            Some(1),
            None,
            register::Request::GetPhase {
                key: "key".to_string(),
            },
        ),
    );
    sender.send(&send).unwrap();
    drop(sender);

    let mut receiver = register_wire::Receiver::new(tmp.as_slice());

    let resp = receiver.recv().unwrap();

    assert_eq!(send, resp);
}

#[test]
fn closed_after_last_line() {
    let mut tmp = Vec::new();

    let mut sender = register_wire::Sender::new(&mut tmp);
    sender
        .send(&Message::new(
            "r0",
            "c",
            MessageBody::new(None, Some(1), register::Response::SetPhaseOk),
        ))
        .unwrap();
    drop(sender);

    let mut receiver = register_wire::Receiver::new(tmp.as_slice());

    receiver.recv::<register::Response>().unwrap();
    assert!(matches!(
        receiver.recv::<register::Response>(),
        Err(WireError::Closed)
    ));
}

#[test]
fn malformed_line() {
    let mut receiver = register_wire::Receiver::new("{\"src\": 1}\n".as_bytes());

    assert!(matches!(
        receiver.recv::<register::Request>(),
        Err(WireError::Json(_))
    ));
}

#[test]
fn raw_lines() {
    let mut tmp = Vec::new();

    let mut sender = register_wire::Sender::new(&mut tmp);
    sender.send_line("{\"not\":\"a message\"}\n").unwrap();
    sender.send_line("second").unwrap();
    drop(sender);

    let mut receiver = register_wire::Receiver::new(tmp.as_slice());

    assert_eq!("{\"not\":\"a message\"}\n", receiver.recv_line().unwrap());
    assert_eq!("second\n", receiver.recv_line().unwrap());
    assert!(matches!(receiver.recv_line(), Err(WireError::Closed)));
}
