//! The string, type, proto and method pools of a dex container.
use std::{
    collections::{BTreeSet, HashMap},
    io::{self, Read, Write},
    str::FromStr,
};

use super::{
    DecodeError, EncodeError, FromReader, ToWriter, read_length,
    reader_utils::{ValueReaderExt, read_byte_chunk},
    write_length,
};
use crate::{
    dex::{ClassRef, DexFile, Instruction, MethodRef},
    types::{
        Descriptor,
        field_type::FieldType,
        method_descriptor::{MethodDescriptor, ReturnType},
    },
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(super) struct RawProto {
    return_type: u32,
    parameters: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) struct RawMethodId {
    class: u32,
    name: u32,
    proto: u32,
}

/// The pools as stored in a container, before any index is resolved.
#[derive(Debug, Default)]
pub(super) struct Pools {
    strings: Vec<String>,
    types: Vec<u32>,
    protos: Vec<RawProto>,
    methods: Vec<RawMethodId>,
}

impl FromReader for Pools {
    fn from_reader<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let string_count = read_length(reader)?;
        let strings = (0..string_count)
            .map(|_| {
                let len = read_length(reader)?;
                let bytes = read_byte_chunk(reader, len)?;
                String::from_utf8(bytes).map_err(|_| DecodeError::BrokenUtf8)
            })
            .collect::<Result<_, _>>()?;
        let type_count = read_length(reader)?;
        let types = (0..type_count)
            .map(|_| reader.read_value())
            .collect::<io::Result<_>>()?;
        let proto_count = read_length(reader)?;
        let protos = (0..proto_count)
            .map(|_| {
                let return_type = reader.read_value()?;
                let param_count: u16 = reader.read_value()?;
                let parameters = (0..param_count)
                    .map(|_| reader.read_value())
                    .collect::<io::Result<_>>()?;
                Ok(RawProto {
                    return_type,
                    parameters,
                })
            })
            .collect::<io::Result<_>>()?;
        let method_count = read_length(reader)?;
        let methods = (0..method_count)
            .map(|_| {
                Ok(RawMethodId {
                    class: reader.read_value()?,
                    proto: reader.read_value()?,
                    name: reader.read_value()?,
                })
            })
            .collect::<io::Result<_>>()?;
        Ok(Self {
            strings,
            types,
            protos,
            methods,
        })
    }
}

impl ToWriter for Pools {
    fn to_writer<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        write_length::<u32>(writer, self.strings.len())?;
        for string in &self.strings {
            write_length::<u32>(writer, string.len())?;
            writer.write_all(string.as_bytes())?;
        }
        write_length::<u32>(writer, self.types.len())?;
        for descriptor_idx in &self.types {
            writer.write_all(&descriptor_idx.to_le_bytes())?;
        }
        write_length::<u32>(writer, self.protos.len())?;
        for proto in &self.protos {
            writer.write_all(&proto.return_type.to_le_bytes())?;
            write_length::<u16>(writer, proto.parameters.len())?;
            for param in &proto.parameters {
                writer.write_all(&param.to_le_bytes())?;
            }
        }
        write_length::<u32>(writer, self.methods.len())?;
        for method in &self.methods {
            writer.write_all(&method.class.to_le_bytes())?;
            writer.write_all(&method.proto.to_le_bytes())?;
            writer.write_all(&method.name.to_le_bytes())?;
        }
        Ok(())
    }
}

fn lookup<'p, T>(pool: &'p [T], name: &'static str, index: u32) -> Result<&'p T, DecodeError> {
    usize::try_from(index)
        .ok()
        .and_then(|idx| pool.get(idx))
        .ok_or(DecodeError::BadPoolIndex { pool: name, index })
}

impl Pools {
    pub(super) fn string(&self, index: u32) -> Result<&str, DecodeError> {
        lookup(&self.strings, "string", index).map(String::as_str)
    }

    pub(super) fn type_descriptor(&self, index: u32) -> Result<&str, DecodeError> {
        let string_idx = *lookup(&self.types, "type", index)?;
        self.string(string_idx)
    }

    pub(super) fn field_type(&self, index: u32) -> Result<FieldType, DecodeError> {
        let descriptor = self.type_descriptor(index)?;
        Ok(FieldType::from_str(descriptor)?)
    }

    pub(super) fn class_ref(&self, index: u32) -> Result<ClassRef, DecodeError> {
        let descriptor = self.type_descriptor(index)?;
        ClassRef::from_descriptor(descriptor)
            .ok_or_else(|| DecodeError::NotAClassType(descriptor.to_owned()))
    }

    pub(super) fn find_type(&self, descriptor: &str) -> Option<u32> {
        self.types
            .iter()
            .position(|it| self.string(*it).is_ok_and(|s| s == descriptor))
            .and_then(|idx| u32::try_from(idx).ok())
    }

    fn proto(&self, index: u32) -> Result<MethodDescriptor, DecodeError> {
        let RawProto {
            return_type,
            parameters,
        } = lookup(&self.protos, "proto", index)?;
        let return_type = ReturnType::from_str(self.type_descriptor(*return_type)?)?;
        let parameters_types = parameters
            .iter()
            .map(|it| self.field_type(*it))
            .collect::<Result<_, _>>()?;
        Ok(MethodDescriptor::new(parameters_types, return_type))
    }

    pub(super) fn method(&self, index: u32) -> Result<MethodRef, DecodeError> {
        let RawMethodId { class, name, proto } = *lookup(&self.methods, "method", index)?;
        Ok(MethodRef::new(
            self.class_ref(class)?,
            self.string(name)?,
            self.proto(proto)?,
        ))
    }
}

/// Collects every value a [`DexFile`] refers to and lays the pools out in sorted order.
#[derive(Debug)]
pub(super) struct PoolBuilder {
    pools: Pools,
    string_indices: HashMap<String, u32>,
    type_indices: HashMap<String, u32>,
    method_indices: HashMap<MethodRef, u32>,
}

impl PoolBuilder {
    pub(super) fn build(dex: &DexFile) -> Result<Self, EncodeError> {
        let mut strings = BTreeSet::new();
        let mut types = BTreeSet::new();
        let mut protos = BTreeSet::new();
        let mut methods = BTreeSet::new();

        let mut add_method = |method: &MethodRef,
                              types: &mut BTreeSet<String>,
                              protos: &mut BTreeSet<MethodDescriptor>| {
            types.insert(method.owner.descriptor());
            types.insert(method.descriptor.return_type.descriptor());
            types.extend(method.descriptor.parameters_types.iter().map(FieldType::descriptor));
            protos.insert(method.descriptor.clone());
            methods.insert(method.clone());
        };

        for class in &dex.classes {
            types.insert(class.class.descriptor());
            if let Some(super_class) = &class.super_class {
                types.insert(super_class.descriptor());
            }
            for method in &class.methods {
                add_method(&method.id, &mut types, &mut protos);
                let Some(code) = &method.code else {
                    continue;
                };
                for insn in &code.instructions {
                    match insn {
                        Instruction::Invoke { method, .. } => {
                            add_method(method, &mut types, &mut protos);
                        }
                        Instruction::ConstString { value, .. } => {
                            strings.insert(value.clone());
                        }
                        Instruction::NewInstance { class, .. } => {
                            types.insert(class.descriptor());
                        }
                        _ => {}
                    }
                }
            }
        }
        strings.extend(types.iter().cloned());
        strings.extend(methods.iter().map(|it| it.name.clone()));

        let string_indices = index_sorted(strings.iter().cloned())?;
        let type_indices = index_sorted(types.iter().cloned())?;

        let mut pools = Pools {
            strings: strings.into_iter().collect(),
            types: types.iter().map(|it| string_indices[it]).collect(),
            ..Pools::default()
        };

        // Protos are ordered by return type, then by parameter list.
        let mut raw_protos: Vec<(RawProto, MethodDescriptor)> = protos
            .into_iter()
            .map(|descriptor| {
                let raw = RawProto {
                    return_type: type_indices[&descriptor.return_type.descriptor()],
                    parameters: descriptor
                        .parameters_types
                        .iter()
                        .map(|it| type_indices[&it.descriptor()])
                        .collect(),
                };
                (raw, descriptor)
            })
            .collect();
        raw_protos.sort();
        let proto_indices = index_sorted(raw_protos.iter().map(|(_, it)| it.clone()))?;
        pools.protos = raw_protos.into_iter().map(|(raw, _)| raw).collect();

        // Methods are ordered by owner, then name, then proto.
        let mut raw_methods: Vec<(RawMethodId, MethodRef)> = methods
            .into_iter()
            .map(|method| {
                let raw = RawMethodId {
                    class: type_indices[&method.owner.descriptor()],
                    name: string_indices[&method.name],
                    proto: proto_indices[&method.descriptor],
                };
                (raw, method)
            })
            .collect();
        raw_methods.sort();
        let method_indices = index_sorted(raw_methods.iter().map(|(_, it)| it.clone()))?;
        pools.methods = raw_methods.into_iter().map(|(raw, _)| raw).collect();

        Ok(Self {
            pools,
            string_indices,
            type_indices,
            method_indices,
        })
    }

    pub(super) fn pools(&self) -> &Pools {
        &self.pools
    }

    pub(super) fn string_index(&self, value: &str) -> u32 {
        self.string_indices[value]
    }

    pub(super) fn type_index(&self, descriptor: &str) -> u32 {
        self.type_indices[descriptor]
    }

    pub(super) fn method_index(&self, method: &MethodRef) -> u32 {
        self.method_indices[method]
    }
}

fn index_sorted<K, I>(values: I) -> Result<HashMap<K, u32>, EncodeError>
where
    K: std::hash::Hash + Eq,
    I: IntoIterator<Item = K>,
{
    values
        .into_iter()
        .enumerate()
        .map(|(idx, value)| Ok((value, u32::try_from(idx)?)))
        .collect()
}
