use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet},
};

use proptest::prelude::*;

use crate::{
    dex::{
        AccessFlags, BinaryOp, ClassDef, ClassRef, Code, Comparison, DexFile, EncodedMethod,
        HeapAllocator, Instruction, InvokeKind, Label, MethodRef, Reg, ValueKind, encode,
    },
    instrument::{ClassFailure, DiagnosticsReporter},
    transform::{EntryHook, HookRef, Transform},
    types::{
        field_type::{FieldType, PrimitiveType},
        method_descriptor::{MethodDescriptor, ReturnType},
    },
    vm::{ClassDefinition, ClassFileLoad, ClassFileLoadHook, VirtualMachine, VmError},
};

pub(crate) fn arb_class_name() -> impl Strategy<Value = String> {
    let arb_ident = prop::string::string_regex(r"[a-zA-Z][\w\$_]*").expect("The regex is invalid");
    prop::collection::vec(arb_ident, 1..6).prop_map(|v| v.join("/"))
}

pub(crate) fn arb_non_array_field_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        any::<PrimitiveType>().prop_map(FieldType::Base),
        arb_class_name()
            .prop_map(ClassRef::new)
            .prop_map(FieldType::Object),
    ]
}

prop_compose! {
    fn arb_array_field_type()(
        t in arb_non_array_field_type(),
        dim in 1..=u8::MAX
    ) -> FieldType {
        FieldType::array_of(t, dim)
    }
}

pub(crate) fn arb_field_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![arb_non_array_field_type(), arb_array_field_type()]
}

fn arb_value_kind() -> impl Strategy<Value = ValueKind> {
    prop_oneof![
        Just(ValueKind::Single),
        Just(ValueKind::Wide),
        Just(ValueKind::Object),
    ]
}

fn arb_reg() -> impl Strategy<Value = Reg> {
    (0u16..16).prop_map(Reg)
}

/// Instructions without branches; every register is below 16.
pub(crate) fn arb_straight_line_instruction() -> impl Strategy<Value = Instruction> {
    prop_oneof![
        Just(Instruction::Nop),
        (arb_value_kind(), arb_reg(), arb_reg())
            .prop_map(|(kind, dst, src)| Instruction::Move { kind, dst, src }),
        (arb_reg(), any::<i32>()).prop_map(|(dst, value)| Instruction::Const { dst, value }),
        (arb_reg(), any::<i64>()).prop_map(|(dst, value)| Instruction::ConstWide { dst, value }),
        (arb_reg(), ".{0,12}").prop_map(|(dst, value)| Instruction::ConstString { dst, value }),
        (arb_reg(), arb_class_name()).prop_map(|(dst, name)| Instruction::NewInstance {
            dst,
            class: FieldType::Object(ClassRef::new(name)),
        }),
        (arb_reg(), arb_reg(), arb_reg()).prop_map(|(dst, a, b)| Instruction::Binary {
            op: BinaryOp::Add,
            dst,
            a,
            b,
        }),
        (arb_class_name(), prop::collection::vec(arb_reg(), 0..4)).prop_map(|(owner, args)| {
            Instruction::Invoke {
                kind: InvokeKind::Virtual,
                method: MethodRef::new(
                    ClassRef::new(owner),
                    "run",
                    int_params_returning_void(args.len().saturating_sub(1)),
                ),
                args,
            }
        }),
    ]
}

fn int_params_returning_void(params: usize) -> MethodDescriptor {
    MethodDescriptor::new(
        vec![FieldType::Base(PrimitiveType::Int); params],
        ReturnType::Void,
    )
}

pub(crate) fn hook_class() -> ClassRef {
    ClassRef::new("pkg/Hook")
}

/// `EntryHook(pkg/Foo.bar()V -> pkg/Hook.onBar)`.
pub(crate) fn bar_entry_hook() -> Transform {
    Transform::from(EntryHook::new(
        MethodRef::new(ClassRef::new("pkg/Foo"), "bar", "()V".parse().unwrap()),
        HookRef::new(hook_class(), "onBar"),
    ))
}

fn method(
    owner: &ClassRef,
    name: &str,
    descriptor: &str,
    access_flags: AccessFlags,
    code: Option<Code>,
) -> EncodedMethod {
    EncodedMethod {
        id: MethodRef::new(owner.clone(), name, descriptor.parse().unwrap()),
        access_flags,
        code,
    }
}

/// A class holding `bar()V`, `static sum(IJ)J`, `call(Lpkg/Service;)Ljava/lang/String;`
/// and the native `nativeCall()V`.
pub(crate) fn class_def(binary_name: &str) -> ClassDef {
    let class = ClassRef::new(binary_name);
    let methods = vec![
        method(
            &class,
            "bar",
            "()V",
            AccessFlags::PUBLIC,
            Some(Code {
                registers: 1,
                ins: 1,
                outs: 0,
                instructions: vec![Instruction::ReturnVoid],
            }),
        ),
        method(
            &class,
            "sum",
            "(IJ)J",
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            Some(Code {
                registers: 4,
                ins: 3,
                outs: 0,
                instructions: vec![
                    Instruction::Const {
                        dst: Reg(0),
                        value: 1,
                    },
                    Instruction::Binary {
                        op: BinaryOp::Add,
                        dst: Reg(1),
                        a: Reg(1),
                        b: Reg(0),
                    },
                    Instruction::Return {
                        kind: ValueKind::Wide,
                        src: Reg(2),
                    },
                ],
            }),
        ),
        method(
            &class,
            "call",
            "(Lpkg/Service;)Ljava/lang/String;",
            AccessFlags::PUBLIC,
            Some(Code {
                registers: 3,
                ins: 2,
                outs: 1,
                instructions: vec![
                    Instruction::Invoke {
                        kind: InvokeKind::Interface,
                        method: MethodRef::new(
                            ClassRef::new("pkg/Service"),
                            "name",
                            "()Ljava/lang/String;".parse().unwrap(),
                        ),
                        args: vec![Reg(2)],
                    },
                    Instruction::MoveResult {
                        kind: ValueKind::Object,
                        dst: Reg(0),
                    },
                    Instruction::Return {
                        kind: ValueKind::Object,
                        src: Reg(0),
                    },
                ],
            }),
        ),
        method(
            &class,
            "nativeCall",
            "()V",
            AccessFlags::PUBLIC | AccessFlags::NATIVE,
            None,
        ),
    ];
    ClassDef {
        class,
        access_flags: AccessFlags::PUBLIC,
        super_class: Some(ClassRef::new(ClassRef::JAVA_LANG_OBJECT)),
        methods,
    }
}

/// A container with the single class `pkg/Foo`.
pub(crate) fn foo_dex() -> DexFile {
    DexFile {
        classes: vec![class_def("pkg/Foo")],
    }
}

/// [`foo_dex`] plus `static loop(I)I`, which counts its argument down to zero.
pub(crate) fn foo_with_branches() -> DexFile {
    let mut dex = foo_dex();
    let class = &mut dex.classes[0];
    let owner = class.class.clone();
    class.methods.push(method(
        &owner,
        "loop",
        "(I)I",
        AccessFlags::STATIC,
        Some(Code {
            registers: 2,
            ins: 1,
            outs: 0,
            instructions: vec![
                Instruction::Const {
                    dst: Reg(0),
                    value: 1,
                },
                Instruction::Label(Label(0)),
                Instruction::IfZero {
                    cmp: Comparison::Le,
                    a: Reg(1),
                    target: Label(1),
                },
                Instruction::Binary {
                    op: BinaryOp::Sub,
                    dst: Reg(1),
                    a: Reg(1),
                    b: Reg(0),
                },
                Instruction::Goto { target: Label(0) },
                Instruction::Label(Label(1)),
                Instruction::Return {
                    kind: ValueKind::Single,
                    src: Reg(1),
                },
            ],
        }),
    ));
    dex
}

/// The container bytes of a VM-loaded class built by [`class_def`].
pub(crate) fn class_bytes(binary_name: &str) -> Vec<u8> {
    let dex = DexFile {
        classes: vec![class_def(binary_name)],
    };
    encode(&dex, &HeapAllocator).unwrap()
}

/// A call made by the instrumenter into [`FakeVm`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) enum VmCall {
    HookEnabled(bool),
    Retransform(String),
    Redefine(Vec<String>),
}

/// An in-memory VM whose loaded classes are container bytes keyed by binary name.
#[derive(Debug, Default)]
pub(crate) struct FakeVm {
    classes: RefCell<BTreeMap<String, Vec<u8>>>,
    pub(crate) unmodifiable: BTreeSet<String>,
    pub(crate) bypass_hook: BTreeSet<String>,
    pub(crate) reject_redefinition: bool,
    pub(crate) refuse_hook_enable: bool,
    pub(crate) refuse_hook_disable: bool,
    hook_enabled: Cell<bool>,
    calls: RefCell<Vec<VmCall>>,
}

impl FakeVm {
    pub(crate) fn with_classes<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Self {
        let vm = Self::default();
        for name in names {
            vm.load(name, class_bytes(name));
        }
        vm
    }

    pub(crate) fn load(&self, name: &str, bytes: Vec<u8>) {
        self.classes.borrow_mut().insert(name.to_owned(), bytes);
    }

    pub(crate) fn class_data(&self, name: &str) -> Vec<u8> {
        self.classes.borrow()[name].clone()
    }

    pub(crate) fn calls(&self) -> Vec<VmCall> {
        self.calls.borrow().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub(crate) fn is_hook_enabled(&self) -> bool {
        self.hook_enabled.get()
    }
}

impl VirtualMachine for FakeVm {
    type ClassHandle = String;
    type Allocator = HeapAllocator;

    fn find_class(&self, binary_name: &str) -> Option<Self::ClassHandle> {
        self.classes
            .borrow()
            .contains_key(binary_name)
            .then(|| binary_name.to_owned())
    }

    fn set_class_file_load_hook_enabled(&self, enabled: bool) -> Result<(), VmError> {
        self.calls.borrow_mut().push(VmCall::HookEnabled(enabled));
        let refused = if enabled {
            self.refuse_hook_enable
        } else {
            self.refuse_hook_disable
        };
        if refused {
            return Err(VmError::NotificationMode);
        }
        self.hook_enabled.set(enabled);
        Ok(())
    }

    fn retransform_class(
        &self,
        class: &Self::ClassHandle,
        hook: &mut ClassFileLoadHook<'_, Self::Allocator>,
    ) -> Result<(), VmError> {
        self.calls
            .borrow_mut()
            .push(VmCall::Retransform(class.clone()));
        if self.unmodifiable.contains(class) {
            return Err(VmError::UnmodifiableClass(class.clone()));
        }
        if !self.hook_enabled.get() || self.bypass_hook.contains(class) {
            return Ok(());
        }
        let current = self.class_data(class);
        let event = ClassFileLoad {
            class_name: class,
            class_data: &current,
        };
        if let Some(bytes) = hook(event) {
            self.load(class, bytes);
        }
        Ok(())
    }

    fn redefine_classes(
        &self,
        definitions: &[ClassDefinition<'_, Self::ClassHandle>],
    ) -> Result<(), VmError> {
        self.calls.borrow_mut().push(VmCall::Redefine(
            definitions.iter().map(|it| it.class.clone()).collect(),
        ));
        if self.reject_redefinition {
            let first = definitions.first().map(|it| it.class.clone());
            return Err(VmError::InvalidClassFormat(first.unwrap_or_default()));
        }
        for definition in definitions {
            self.load(definition.class, definition.class_data.to_vec());
        }
        Ok(())
    }

    fn allocator(&self) -> &Self::Allocator {
        &HeapAllocator
    }
}

/// Records every report it receives.
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    pub(crate) failures: RefCell<Vec<ClassFailure>>,
    pub(crate) unhandled: RefCell<Vec<String>>,
}

impl DiagnosticsReporter for RecordingReporter {
    fn instrumentation_failures(&self, failures: &[ClassFailure]) {
        self.failures.borrow_mut().extend_from_slice(failures);
    }

    fn unhandled_failure(&self, message: &str) {
        self.unhandled.borrow_mut().push(message.to_owned());
    }
}
