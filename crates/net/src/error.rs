use std::io;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("no free UDP port in {start}..={end}")]
    NoFreePort { start: u16, end: u16 },
    #[error("no peer endpoint configured")]
    NoPeer,
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("only the {required} side may do this")]
    WrongRole { required: &'static str },
}
