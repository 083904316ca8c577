use super::protocol::PacketError;

/// Fixed-layout big-endian writer over a pre-sized buffer.
///
/// Every field occupies a fixed number of bytes; strings are truncated to
/// their slot and zero padded so the record never changes size.
pub(crate) struct WireWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    pub fn u8(&mut self, value: u8) {
        self.put(&[value]);
    }

    pub fn bool(&mut self, value: bool) {
        self.u8(value as u8);
    }

    pub fn u16(&mut self, value: u16) {
        self.put(&value.to_be_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.put(&value.to_be_bytes());
    }

    pub fn i32(&mut self, value: i32) {
        self.put(&value.to_be_bytes());
    }

    pub fn f32(&mut self, value: f32) {
        self.u32(value.to_bits());
    }

    /// Writes `value` into a `slot`-byte field, keeping at least one trailing NUL.
    pub fn str(&mut self, value: &str, slot: usize) {
        let text = truncate_str(value, slot - 1);
        let start = self.pos;
        self.put(text.as_bytes());
        self.buf[self.pos..start + slot].fill(0);
        self.pos = start + slot;
    }

    pub fn skip(&mut self, len: usize) {
        self.buf[self.pos..self.pos + len].fill(0);
        self.pos += len;
    }
}

pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        let end = self.pos + len;
        let bytes = self.buf.get(self.pos..end).ok_or(PacketError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], PacketError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, PacketError> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> Result<u16, PacketError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, PacketError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, PacketError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32, PacketError> {
        Ok(f32::from_bits(self.u32()?))
    }

    pub fn str(&mut self, slot: usize) -> Result<String, PacketError> {
        let bytes = self.take(slot)?;
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(slot);
        Ok(String::from_utf8_lossy(&bytes[..len]).into_owned())
    }

    pub fn skip(&mut self, len: usize) -> Result<(), PacketError> {
        self.take(len).map(|_| ())
    }
}

/// Longest prefix of `value` that fits in `max` bytes without splitting a char.
pub fn truncate_str(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
