mod codec;
mod connection;
mod message;

pub use codec::{ContentLengthCodec, DEFAULT_MAX_FRAME};
pub use connection::{IncomingHandler, JsonRpcConnection};
pub use message::{
    IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
    SERVER_ERROR,
};
