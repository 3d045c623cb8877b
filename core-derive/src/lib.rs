//! Derive macros for storing value and as-str enums directly in Scylla columns

extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::Ident;

/// Add the json based serialize impl
fn add_json_serialize(stream: &mut proc_macro2::TokenStream, name: &Ident) {
    // extend our token stream
    stream.extend(quote! {
        impl scylla::serialize::value::SerializeValue for #name {
            fn serialize<'b>(
                &self,
                typ: &scylla::frame::response::result::ColumnType,
                writer: scylla::serialize::writers::CellWriter<'b>,
            ) -> Result<scylla::serialize::writers::WrittenCellProof<'b>, scylla::serialize::SerializationError> {
                // cast our value to a json string
                let value = match serde_json::to_string(self) {
                    Ok(value) => value,
                    Err(error) => return Err(scylla::serialize::SerializationError::new(error)),
                };
                scylla::serialize::value::SerializeValue::serialize(&value, typ, writer)
            }
        }
    })
}

/// Add the json based deserialize impl
fn add_json_deserialize(stream: &mut proc_macro2::TokenStream, name: &Ident) {
    // extend our token stream
    stream.extend(quote! {
        impl<'frame, 'metadata> scylla::deserialize::DeserializeValue<'frame, 'metadata> for #name {
            fn type_check(typ: &scylla::frame::response::result::ColumnType) -> Result<(), scylla::deserialize::TypeCheckError> {
                if let scylla::frame::response::result::ColumnType::Text = typ {
                    return Ok(());
                }
                Err(scylla::deserialize::TypeCheckError::new(crate::utils::errors::DeserializationError::ExpectedText))
            }

            fn deserialize(
                _typ: &'metadata scylla::frame::response::result::ColumnType<'metadata>,
                v: Option<scylla::deserialize::FrameSlice<'frame>>,
            ) -> Result<Self, scylla::deserialize::DeserializationError> {
                match v {
                    Some(fslice) => match serde_json::from_slice(fslice.as_slice()) {
                        Ok(value) => Ok(value),
                        Err(_) => Err(scylla::deserialize::DeserializationError::new(
                            crate::utils::errors::DeserializationError::UnknownValue,
                        )),
                    },
                    None => Err(scylla::deserialize::DeserializationError::new(
                        crate::utils::errors::DeserializationError::ExpectedNotNull,
                    )),
                }
            }
        }
    })
}

/// Store any JSON-serializable type in a single Scylla `TEXT` column
///
/// Used for the structured sub-fields (`Inputs`, `Output`, `Pods`, ...) that
/// don't map cleanly onto scalar CQL columns.
#[proc_macro_derive(ScyllaStoreJson)]
pub fn derive_scylla_store_json(stream: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(stream as syn::DeriveInput);
    let name = &ast.ident;
    let mut output = quote! {};
    add_json_serialize(&mut output, name);
    add_json_deserialize(&mut output, name);
    output.into()
}

/// Add the as-str based serialize impl
fn add_as_str_serialize(stream: &mut proc_macro2::TokenStream, name: &Ident) {
    stream.extend(quote! {
        impl scylla::serialize::value::SerializeValue for #name {
            fn serialize<'b>(
                &self,
                typ: &scylla::frame::response::result::ColumnType,
                writer: scylla::serialize::writers::CellWriter<'b>,
            ) -> Result<scylla::serialize::writers::WrittenCellProof<'b>, scylla::serialize::SerializationError> {
                let value = &self.as_str();
                scylla::serialize::value::SerializeValue::serialize(&value, typ, writer)
            }
        }
    })
}

/// Add the as-str based deserialize impl
fn add_as_str_deserialize(stream: &mut proc_macro2::TokenStream, name: &Ident) {
    stream.extend(quote! {
        impl<'frame, 'metadata> scylla::deserialize::DeserializeValue<'frame, 'metadata> for #name {
            fn type_check(typ: &scylla::frame::response::result::ColumnType) -> Result<(), scylla::deserialize::TypeCheckError> {
                if let scylla::frame::response::result::ColumnType::Text = typ {
                    return Ok(());
                }
                Err(scylla::deserialize::TypeCheckError::new(crate::utils::errors::DeserializationError::ExpectedText))
            }

            fn deserialize(
                _typ: &'metadata scylla::frame::response::result::ColumnType<'metadata>,
                v: Option<scylla::deserialize::FrameSlice<'frame>>,
            ) -> Result<Self, scylla::deserialize::DeserializationError> {
                match v {
                    Some(fslice) => {
                        let converted = match std::str::from_utf8(fslice.as_slice()) {
                            Ok(converted) => converted,
                            Err(_) => {
                                return Err(scylla::deserialize::DeserializationError::new(
                                    crate::utils::errors::DeserializationError::ExpectedText,
                                ))
                            }
                        };
                        match #name::from_str(converted) {
                            Ok(value) => Ok(value),
                            Err(_) => Err(scylla::deserialize::DeserializationError::new(
                                crate::utils::errors::DeserializationError::UnknownValue,
                            )),
                        }
                    }
                    None => Err(scylla::deserialize::DeserializationError::new(
                        crate::utils::errors::DeserializationError::ExpectedNotNull,
                    )),
                }
            }
        }
    })
}

/// Store an enum that implements `as_str`/`FromStr` directly in a Scylla `TEXT` column
///
/// Used for the state enums (`JobState`, `PipelineState`, `ChunkState`) so their
/// column value is a readable string rather than an opaque integer tag.
#[proc_macro_derive(ScyllaStoreAsStr)]
pub fn derive_scylla_store_as_str(stream: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(stream as syn::DeriveInput);
    let name = &ast.ident;
    let mut output = quote! {};
    add_as_str_serialize(&mut output, name);
    add_as_str_deserialize(&mut output, name);
    output.into()
}
