//! Rejects values JSON would silently flatten
//!
//! `serde_json` writes NaN and the infinities as `null`, which makes them
//! indistinguishable from each other and from `None`. Values are walked once
//! with [`ensure_finite`] before they are hashed or stored.

use serde::ser::{self, Serialize};
use std::fmt;

/// Fails if `value` holds a NaN or infinite float anywhere inside it
pub(crate) fn ensure_finite<T: Serialize + ?Sized>(value: &T) -> Result<(), Unrepresentable> {
    value.serialize(FiniteCheck)
}

#[derive(Debug)]
pub(crate) struct Unrepresentable(String);

impl fmt::Display for Unrepresentable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Unrepresentable {}

impl ser::Error for Unrepresentable {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Unrepresentable(msg.to_string())
    }
}

fn check_float(v: f64) -> Result<(), Unrepresentable> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(Unrepresentable(format!("non-finite float {} has no JSON form", v)))
    }
}

#[derive(Clone, Copy)]
struct FiniteCheck;

impl ser::Serializer for FiniteCheck {
    type Ok = ();
    type Error = Unrepresentable;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_i128(self, _: i128) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_u128(self, _: u128) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<(), Unrepresentable> {
        check_float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), Unrepresentable> {
        check_float(v)
    }

    fn serialize_char(self, _: char) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_str(self, _: &str) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_none(self) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), Unrepresentable> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<(), Unrepresentable> {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<(), Unrepresentable> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<(), Unrepresentable> {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self, Unrepresentable> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self, Unrepresentable> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Unrepresentable> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Unrepresentable> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self, Unrepresentable> {
        Ok(self)
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, Unrepresentable> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Unrepresentable> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteCheck {
    type Ok = ();
    type Error = Unrepresentable;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Unrepresentable> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteCheck {
    type Ok = ();
    type Error = Unrepresentable;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Unrepresentable> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteCheck {
    type Ok = ();
    type Error = Unrepresentable;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Unrepresentable> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteCheck {
    type Ok = ();
    type Error = Unrepresentable;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Unrepresentable> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteCheck {
    type Ok = ();
    type Error = Unrepresentable;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Unrepresentable> {
        key.serialize(FiniteCheck)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Unrepresentable> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteCheck {
    type Ok = ();
    type Error = Unrepresentable;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> Result<(), Unrepresentable> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteCheck {
    type Ok = ();
    type Error = Unrepresentable;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> Result<(), Unrepresentable> {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}
