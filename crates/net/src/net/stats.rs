#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub punches_sent: u64,
    pub punches_received: u64,
    pub retransmissions: u64,
    pub reliable_dropped: u64,
    pub datagrams_dropped: u64,
}
