//! Record framing: a region is a run of `<varint length><payload>` records.

use super::proto::Message;
use super::varint::decode_varint;
use crate::error::{ImageError, Result};

/// Walks the length-prefixed records of one byte region
///
/// The reader only knows about framing; what a payload means is decided by
/// the caller, either by taking raw payloads from the iterator or by asking
/// for the next record decoded as a [`Message`].
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far, framing included
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Read the next framed payload, or `None` once the region is consumed
    pub fn next_payload(&mut self) -> Result<Option<&'a [u8]>> {
        if self.is_exhausted() {
            return Ok(None);
        }

        let start = self.pos;
        let rest = &self.buf[start..];
        let (declared, header_len) = decode_varint(rest).map_err(|source| ImageError::Varint {
            offset: start,
            source,
        })?;

        let available = rest.len() - header_len;
        if declared > available as u64 {
            return Err(ImageError::RecordOverrun {
                offset: start,
                declared,
                available,
            });
        }

        let end = header_len + declared as usize;
        self.pos += end;
        Ok(Some(&rest[header_len..end]))
    }

    /// Read and decode the next record
    pub fn next_message<M: Message>(&mut self) -> Result<Option<M>> {
        match self.next_payload()? {
            Some(payload) => M::decode(payload).map(Some),
            None => Ok(None),
        }
    }
}

impl<'a> Iterator for RecordReader<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_payload() {
            Ok(Some(payload)) => Some(Ok(payload)),
            Ok(None) => None,
            Err(e) => {
                // Stop after the first framing error
                self.pos = self.buf.len();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::varint::encode_varint;

    fn frame(records: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        for record in records {
            encode_varint(record.len() as u64, &mut buf);
            buf.extend_from_slice(record);
        }
        buf
    }

    #[test]
    fn test_walks_all_records() {
        let long = vec![7u8; 200];
        let buf = frame(&[b"abc", b"", &long]);
        let reader = RecordReader::new(&buf);

        let payloads: Vec<&[u8]> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[0], b"abc");
        assert!(payloads[1].is_empty());
        assert_eq!(payloads[2].len(), 200);
    }

    #[test]
    fn test_consumed_tracks_framing() {
        let buf = frame(&[b"abc", b"de"]);
        let mut reader = RecordReader::new(&buf);

        reader.next_payload().unwrap();
        assert_eq!(reader.consumed(), 4);
        reader.next_payload().unwrap();
        assert_eq!(reader.consumed(), buf.len());
        assert!(reader.is_exhausted());
        assert_eq!(reader.next_payload().unwrap(), None);
    }

    #[test]
    fn test_record_past_region_is_error() {
        let mut buf = frame(&[b"abcdef"]);
        buf.truncate(buf.len() - 2);
        let mut reader = RecordReader::new(&buf);

        match reader.next_payload() {
            Err(ImageError::RecordOverrun {
                offset,
                declared,
                available,
            }) => {
                assert_eq!(offset, 0);
                assert_eq!(declared, 6);
                assert_eq!(available, 4);
            }
            other => panic!("expected overrun, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_length_prefix_is_error() {
        let buf = [0x80u8];
        let mut reader = RecordReader::new(&buf);
        assert!(matches!(
            reader.next_payload(),
            Err(ImageError::Varint { offset: 0, .. })
        ));
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let mut buf = frame(&[b"ok"]);
        buf.push(0x05);
        let mut reader = RecordReader::new(&buf);

        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }
}
