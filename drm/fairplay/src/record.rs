use crate::error::RecordError;

const HEADER_LEN: usize = 8;

/**
    One tag-delimited record: `tag (u32 BE) || length (u32 BE) || value`.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedRecord {
    pub tag: u32,
    pub value: Vec<u8>,
}

impl TaggedRecord {
    pub fn new(tag: u32, value: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }
}

/**
    Ordered sequence of records. Duplicate tags are legal and kept in order;
    unknown tags are carried as opaque values.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: Vec<TaggedRecord>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tag: u32, value: impl Into<Vec<u8>>) {
        self.records.push(TaggedRecord::new(tag, value));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaggedRecord> {
        self.records.iter()
    }

    /// First record carrying `tag`, if any.
    pub fn find(&self, tag: u32) -> Option<&TaggedRecord> {
        self.records.iter().find(|r| r.tag == tag)
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.find(tag).is_some()
    }

    /**
        Decode records until the input is exhausted.

        Errors:
          - `Truncated` when a header or value runs past the end of input
          - `InvalidTag` for the reserved tag 0
    */
    pub fn decode(data: &[u8]) -> Result<Self, RecordError> {
        let mut records = Vec::new();
        let mut offset = 0usize;

        while offset < data.len() {
            let header = data
                .get(offset..offset + HEADER_LEN)
                .ok_or(RecordError::Truncated)?;
            let tag = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
            let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

            if tag == 0 {
                return Err(RecordError::InvalidTag(tag));
            }

            let start = offset + HEADER_LEN;
            let end = start.checked_add(len).ok_or(RecordError::Truncated)?;
            let value = data.get(start..end).ok_or(RecordError::Truncated)?;

            records.push(TaggedRecord::new(tag, value));
            offset = end;
        }

        Ok(Self { records })
    }

    /**
        Serialize every record in order. Tag 0 is refused here as well so an
        encoded set always decodes again.
    */
    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for record in &self.records {
            if record.tag == 0 {
                return Err(RecordError::InvalidTag(record.tag));
            }
            let len = u32::try_from(record.value.len())
                .map_err(|_| RecordError::ValueTooLarge(record.value.len()))?;
            out.extend_from_slice(&record.tag.to_be_bytes());
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(&record.value);
        }
        Ok(out)
    }

    pub fn encoded_len(&self) -> usize {
        self.records
            .iter()
            .map(|r| HEADER_LEN + r.value.len())
            .sum()
    }
}

impl FromIterator<TaggedRecord> for RecordSet {
    fn from_iter<I: IntoIterator<Item = TaggedRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RecordSet {
    type Item = TaggedRecord;
    type IntoIter = std::vec::IntoIter<TaggedRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a TaggedRecord;
    type IntoIter = std::slice::Iter<'a, TaggedRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
