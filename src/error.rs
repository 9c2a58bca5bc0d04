use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no nodes found in the cluster configuration")]
    NoNodesDiscovered,

    #[error("configuration endpoint returned an error line")]
    InvalidCommand,

    #[error("discovery transport failure: {0}")]
    Transport(#[from] std::io::Error),

    #[error("membership snapshot has no nodes")]
    EmptyMembership,

    #[error("no cluster membership discovered yet")]
    NoActiveMembership,
}
