/// Request and response bodies for the replica RPCs
pub mod register {
    /// The request was not a well-formed RPC
    pub const MALFORMED_REQUEST: u64 = 12;
    /// The request carried a timestamp that can never be issued by a client
    pub const INVALID_TIMESTAMP: u64 = 13;

    #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    pub struct Timestamp {
        pub sequence: u64,
        pub owner_id: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    pub struct StoredValue {
        pub value: String,
        pub timestamp: Timestamp,
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum Request {
        GetPhase {
            key: String,
        },
        SetPhase {
            key: String,
            value: String,
            timestamp: Timestamp,
        },
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum Response {
        GetPhaseOk { value: Option<StoredValue> },
        SetPhaseOk,
        Error { code: u64, text: String },
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message<C> {
    src: String,
    dest: String,
    body: MessageBody<C>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MessageBody<C> {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    msg_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    in_reply_to: Option<u64>,
    #[serde(flatten)]
    content: C,
}

impl<C> Message<C> {
    pub fn new<S, D>(src: S, dest: D, body: MessageBody<C>) -> Self
    where
        S: Into<String>,
        D: Into<String>,
    {
        Self {
            src: src.into(),
            dest: dest.into(),
            body,
        }
    }

    /// Builds the reply to this message, swapping source and destination
    pub fn reply<C2>(&self, body: MessageBody<C2>) -> Message<C2> {
        Message {
            src: self.dest.clone(),
            dest: self.src.clone(),
            body,
        }
    }

    pub fn body(&self) -> &MessageBody<C> {
        &self.body
    }

    pub fn into_body(self) -> MessageBody<C> {
        self.body
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn dest(&self) -> &str {
        &self.dest
    }
}

impl<C> MessageBody<C> {
    pub fn new(msg_id: Option<u64>, in_reply_to: Option<u64>, content: C) -> Self {
        Self {
            msg_id,
            in_reply_to,
            content,
        }
    }

    pub fn reply<C2>(&self, msg_id: u64, content: C2) -> MessageBody<C2> {
        MessageBody {
            msg_id: Some(msg_id),
            in_reply_to: self.msg_id,
            content,
        }
    }

    pub fn id(&self) -> Option<u64> {
        self.msg_id
    }

    pub fn replied_to(&self) -> Option<u64> {
        self.in_reply_to
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    pub fn into_content(self) -> C {
        self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_get_phase() {
        let result = serde_json::to_string(&Message::new(
            "client",
            "r0",
            MessageBody::new(
                Some(1),
                None,
                register::Request::GetPhase {
                    key: "x".to_string(),
                },
            ),
        ))
        .unwrap();

        assert_eq!(
            "{\"src\":\"client\",\"dest\":\"r0\",\"body\":{\"msg_id\":1,\"type\":\"get_phase\",\"key\":\"x\"}}",
            result
        );
    }

    #[test]
    fn absent_value_is_null() {
        let result = serde_json::to_string(&register::Response::GetPhaseOk { value: None }).unwrap();

        assert_eq!("{\"type\":\"get_phase_ok\",\"value\":null}", result);
    }

    #[test]
    fn deserialize_set_phase() {
        let raw = "{\"src\":\"c\",\"dest\":\"r1\",\"body\":{\"msg_id\":7,\"type\":\"set_phase\",\"key\":\"x\",\"value\":\"hello\",\"timestamp\":{\"sequence\":3,\"owner_id\":\"A\"}}}";

        let msg: Message<register::Request> = serde_json::from_str(raw).unwrap();

        assert_eq!(Some(7), msg.body().id());
        assert_eq!(
            &register::Request::SetPhase {
                key: "x".to_string(),
                value: "hello".to_string(),
                timestamp: register::Timestamp {
                    sequence: 3,
                    owner_id: "A".to_string(),
                },
            },
            msg.body().content()
        );
    }

    #[test]
    fn reply_swaps_endpoints() {
        let req = Message::new(
            "client",
            "r0",
            MessageBody::new(
                Some(4),
                None,
                register::Request::GetPhase {
                    key: "k".to_string(),
                },
            ),
        );

        let resp = req.reply(req.body().reply(9, register::Response::SetPhaseOk));

        assert_eq!("r0", resp.src());
        assert_eq!("client", resp.dest());
        assert_eq!(Some(9), resp.body().id());
        assert_eq!(Some(4), resp.body().replied_to());
    }
}
