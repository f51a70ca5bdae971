//! Serialization of SOME/IP data.
//!
//! Provides the [`Serialize`] and [`Deserialize`] traits used to move headers, discovery entries
//! and payloads in and out of byte buffers, together with implementations for the basic types
//! that appear on the wire.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Serialize data into a SOME/IP byte stream.
pub trait Serialize {
    /// Serializes the implementing type into the buffer.
    ///
    /// Returns the size of the serialized data.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer does not have enough space left for the data.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bytes::BytesMut;
    /// use rsomeip_core::codec::Serialize;
    ///
    /// let mut buffer = BytesMut::with_capacity(3);
    /// assert_eq!(1u8.serialize(&mut buffer), Ok(1));
    /// assert_eq!(2u16.serialize(&mut buffer), Ok(2));
    /// assert_eq!(&buffer.freeze()[..], &[1u8, 0u8, 2u8][..]);
    /// ```
    fn serialize(&self, buffer: &mut impl BufMut) -> Result<usize, SerializeError>;

    /// Returns the expected size of the serialized data.
    fn size_hint(&self) -> usize;

    /// Serializes the implementing type into a newly allocated buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_bytes(&self) -> Result<Bytes, SerializeError> {
        let mut buffer = BytesMut::with_capacity(self.size_hint());
        self.serialize(&mut buffer)?;
        Ok(buffer.freeze())
    }
}

/// Deserialize data from a SOME/IP byte stream.
pub trait Deserialize {
    /// Type of the data that will be deserialized.
    type Output: Sized;

    /// Deserializes an instance of [`Deserialize::Output`] from the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer runs out of data or contains unexpected values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bytes::Bytes;
    /// use rsomeip_core::codec::{Deserialize, DeserializeError};
    ///
    /// let mut buffer = Bytes::copy_from_slice(&[1u8, 2u8]);
    /// assert_eq!(u8::deserialize(&mut buffer), Ok(1u8));
    /// assert_eq!(u8::deserialize(&mut buffer), Ok(2u8));
    /// assert_eq!(u8::deserialize(&mut buffer), Err(DeserializeError));
    /// ```
    fn deserialize(buffer: &mut Bytes) -> Result<Self::Output, DeserializeError>;
}

macro_rules! impl_basic_type {
    ($t:ty, $put:ident, $get:ident) => {
        impl Serialize for $t {
            fn serialize(&self, buffer: &mut impl BufMut) -> Result<usize, SerializeError> {
                if buffer.remaining_mut() < size_of::<$t>() {
                    return Err(SerializeError);
                }
                buffer.$put(*self);
                Ok(size_of::<$t>())
            }

            fn size_hint(&self) -> usize {
                size_of::<$t>()
            }
        }

        impl Deserialize for $t {
            type Output = Self;

            fn deserialize(buffer: &mut Bytes) -> Result<Self::Output, DeserializeError> {
                if buffer.remaining() < size_of::<$t>() {
                    return Err(DeserializeError);
                }
                Ok(buffer.$get())
            }
        }
    };
}

impl_basic_type!(u8, put_u8, get_u8);
impl_basic_type!(u16, put_u16, get_u16);
impl_basic_type!(u32, put_u32, get_u32);

impl Serialize for Bytes {
    fn serialize(&self, buffer: &mut impl BufMut) -> Result<usize, SerializeError> {
        if buffer.remaining_mut() < self.len() {
            return Err(SerializeError);
        }
        buffer.put_slice(self);
        Ok(self.len())
    }

    fn size_hint(&self) -> usize {
        self.len()
    }
}

impl Deserialize for Bytes {
    type Output = Self;

    fn deserialize(buffer: &mut Bytes) -> Result<Self::Output, DeserializeError> {
        Ok(buffer.split_to(buffer.remaining()))
    }
}

impl<T> Serialize for [T]
where
    T: Serialize,
{
    fn serialize(&self, buffer: &mut impl BufMut) -> Result<usize, SerializeError> {
        let mut size = 0;
        for item in self {
            size += item.serialize(buffer)?;
        }
        Ok(size)
    }

    fn size_hint(&self) -> usize {
        self.iter().map(Serialize::size_hint).sum()
    }
}

impl<T> Deserialize for Vec<T>
where
    T: Deserialize<Output = T>,
{
    type Output = Self;

    fn deserialize(buffer: &mut Bytes) -> Result<Self::Output, DeserializeError> {
        let mut vec = vec![];
        while buffer.has_remaining() {
            vec.push(T::deserialize(buffer)?);
        }
        Ok(vec)
    }
}

/// Represents an error when serializing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("not enough space in buffer")]
pub struct SerializeError;

/// Represents an error when deserializing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unexpected data in buffer")]
pub struct DeserializeError;
