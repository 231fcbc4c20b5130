pub mod error;
pub mod ids;
pub mod messages;
pub mod status;


pub use error::{HedraError, Result};
pub use ids::{
    AccountId, CollisionPolicy, FileId, Timestamp, TopicId, TransactionId, TransactionIdGenerator,
};
pub use messages::{
    AccountAmount, AccountBalance, AccountInfo, FileContents, Query, QueryHeader, QueryKind,
    QueryResponse, ResponseBody, ResponseHeader, ResponseType, SignatureMap, SignaturePair,
    SignedTransaction, TransactionBody, TransactionData, TransactionEnvelope, TransactionReceipt,
    TransactionSubmitResponse, TransferList,
};
pub use status::Status;
