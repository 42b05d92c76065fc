use alloc::{boxed::Box, vec::Vec};
use core::str;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: Box<str>,
    pub data: Box<[u8]>,
}

impl Property {
    pub fn new(name: &str, data: &[u8]) -> Property {
        Property {
            name: Box::from(name),
            data: Box::from(data),
        }
    }

    pub fn new_empty(name: &str) -> Property {
        Property::new(name, &[])
    }

    pub fn new_u32(name: &str, value: u32) -> Property {
        Property::new(name, &value.to_be_bytes())
    }

    pub fn new_cells(name: &str, cells: &[u32]) -> Property {
        let data: Vec<u8> = cells.iter().flat_map(|c| c.to_be_bytes()).collect();
        Property::new(name, &data)
    }

    pub fn new_str(name: &str, value: &str) -> Property {
        Property::new_strlist(name, &[value])
    }

    /// Each string is stored NUL terminated, one after another.
    pub fn new_strlist(name: &str, values: &[&str]) -> Property {
        let mut data = Vec::new();
        for value in values {
            data.extend_from_slice(value.as_bytes());
            data.push(0);
        }
        Property::new(name, &data)
    }
}

impl Property {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn value_as_u32(&self) -> Result<u32, PropertyError> {
        let bytes = self.data.get(0..4).ok_or(PropertyError::InvalidPropFormat)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn value_as_u64(&self) -> Result<u64, PropertyError> {
        let cells = self.value_as_cells()?;
        match cells.as_slice() {
            [hi, lo, ..] => Ok(((*hi as u64) << 32) | *lo as u64),
            _ => Err(PropertyError::InvalidPropFormat),
        }
    }

    /// The property as a list of big-endian 32-bit cells.
    pub fn value_as_cells(&self) -> Result<Vec<u32>, PropertyError> {
        if self.data.len() % 4 != 0 {
            return Err(PropertyError::InvalidPropFormat);
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    pub fn value_as_str(&self) -> Result<&str, PropertyError> {
        str::from_utf8(&self.data)
            .map(|s| s.trim_end_matches('\0'))
            .map_err(|_| PropertyError::InvalidPropFormat)
    }

    pub fn value_as_strlist(&self) -> Result<Vec<&str>, PropertyError> {
        let mut res = Vec::new();
        let mut st = 0;
        for (i, byte) in self.data.iter().enumerate() {
            if *byte == 0 {
                res.push(self.str_at(st..i)?);
                st = i + 1;
            }
        }
        if st != self.data.len() {
            // add last if not terminated with 0
            res.push(self.str_at(st..self.data.len())?);
        }
        Ok(res)
    }

    fn str_at(&self, range: core::ops::Range<usize>) -> Result<&str, PropertyError> {
        str::from_utf8(&self.data[range]).map_err(|_| PropertyError::InvalidPropFormat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyError {
    InvalidPropFormat,
    PropNotFound,
    DanglingHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strlist_round_trip_and_unterminated_tail() {
        let prop = Property::new_strlist("compatible", &["acme,uart-v2", "acme,uart"]);
        assert_eq!(
            prop.value_as_strlist().unwrap(),
            alloc::vec!["acme,uart-v2", "acme,uart"]
        );
        let raw = Property::new("compatible", b"a\0b");
        assert_eq!(raw.value_as_strlist().unwrap(), alloc::vec!["a", "b"]);
    }

    #[test]
    fn cells_require_whole_words() {
        let prop = Property::new("reg", &[0, 0, 0, 1, 0]);
        assert_eq!(prop.value_as_cells(), Err(PropertyError::InvalidPropFormat));
        assert_eq!(prop.value_as_u32(), Ok(1));
        assert_eq!(
            Property::new_empty("x").value_as_u32(),
            Err(PropertyError::InvalidPropFormat)
        );
    }

    #[test]
    fn u64_from_two_cells() {
        let prop = Property::new_cells("size", &[0x1, 0x8000_0000]);
        assert_eq!(prop.value_as_u64(), Ok(0x1_8000_0000));
    }
}
