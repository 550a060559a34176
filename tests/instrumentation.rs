use std::{cell::RefCell, collections::HashMap};

use dexhook::{
    dex::{
        AccessFlags, ClassDef, ClassRef, Code, DexFile, EncodedMethod, HeapAllocator, Instruction,
        InvokeKind, MethodRef, Reg, ValueKind, decode, encode,
    },
    instrument::{ClassOutcome, Instrumenter, TracingReporter, TransformCache},
    transform::{DetourInvoke, EntryHook, ExitHook, HookRef, Transform},
    vm::{ClassDefinition, ClassFileLoad, ClassFileLoadHook, VirtualMachine, VmError},
};

#[derive(Debug, Default)]
struct SingleThreadVm {
    classes: RefCell<HashMap<String, Vec<u8>>>,
}

impl VirtualMachine for SingleThreadVm {
    type ClassHandle = String;
    type Allocator = HeapAllocator;

    fn find_class(&self, binary_name: &str) -> Option<String> {
        self.classes
            .borrow()
            .contains_key(binary_name)
            .then(|| binary_name.to_owned())
    }

    fn set_class_file_load_hook_enabled(&self, _enabled: bool) -> Result<(), VmError> {
        Ok(())
    }

    fn retransform_class(
        &self,
        class: &String,
        hook: &mut ClassFileLoadHook<'_, HeapAllocator>,
    ) -> Result<(), VmError> {
        let current = self.classes.borrow()[class].clone();
        let event = ClassFileLoad {
            class_name: class,
            class_data: &current,
        };
        if let Some(bytes) = hook(event) {
            self.classes.borrow_mut().insert(class.clone(), bytes);
        }
        Ok(())
    }

    fn redefine_classes(&self, definitions: &[ClassDefinition<'_, String>]) -> Result<(), VmError> {
        let mut classes = self.classes.borrow_mut();
        for definition in definitions {
            classes.insert(definition.class.clone(), definition.class_data.to_vec());
        }
        Ok(())
    }

    fn allocator(&self) -> &HeapAllocator {
        &HeapAllocator
    }
}

fn foo_class() -> DexFile {
    let foo = ClassRef::new("pkg/Foo");
    let bar = EncodedMethod {
        id: MethodRef::new(foo.clone(), "bar", "()V".parse().unwrap()),
        access_flags: AccessFlags::PUBLIC,
        code: Some(Code {
            registers: 1,
            ins: 1,
            outs: 0,
            instructions: vec![Instruction::ReturnVoid],
        }),
    };
    let fetch = EncodedMethod {
        id: MethodRef::new(
            foo.clone(),
            "fetch",
            "(Lpkg/Client;)Ljava/lang/String;".parse().unwrap(),
        ),
        access_flags: AccessFlags::PUBLIC,
        code: Some(Code {
            registers: 3,
            ins: 2,
            outs: 1,
            instructions: vec![
                Instruction::Invoke {
                    kind: InvokeKind::Virtual,
                    method: MethodRef::new(
                        ClassRef::new("pkg/Client"),
                        "get",
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
    };
    DexFile {
        classes: vec![ClassDef {
            class: foo,
            access_flags: AccessFlags::PUBLIC,
            super_class: Some(ClassRef::new("java/lang/Object")),
            methods: vec![bar, fetch],
        }],
    }
}

fn loaded_vm() -> SingleThreadVm {
    let vm = SingleThreadVm::default();
    let bytes = encode(&foo_class(), &HeapAllocator).unwrap();
    vm.classes.borrow_mut().insert("pkg/Foo".to_owned(), bytes);
    vm
}

fn hooks() -> ClassRef {
    ClassRef::new("pkg/Hook")
}

fn bar() -> MethodRef {
    MethodRef::new(ClassRef::new("pkg/Foo"), "bar", "()V".parse().unwrap())
}

#[test]
fn entry_hook_calls_the_hook_first() {
    let vm = loaded_vm();
    let transforms = [Transform::from(EntryHook::new(
        bar(),
        HookRef::new(hooks(), "onBar"),
    ))];
    let report = Instrumenter::new(&vm, None, &TracingReporter)
        .instrument(&transforms)
        .unwrap();
    assert_eq!(report.outcome("pkg/Foo"), Some(&ClassOutcome::Retransformed));

    let bytes = vm.classes.borrow()["pkg/Foo"].clone();
    let dex = decode(&bytes, "pkg/Foo").unwrap();
    let class = dex.find_class(&ClassRef::new("pkg/Foo")).unwrap();
    let bar = class.find_method("bar", &"()V".parse().unwrap()).unwrap();
    let code = bar.code.as_ref().unwrap();
    let Instruction::Invoke { kind, method, args } = &code.instructions[0] else {
        panic!("bar does not start with an invoke");
    };
    assert_eq!(*kind, InvokeKind::Static);
    assert_eq!(method.to_string(), "pkg/Hook.onBar(Lpkg/Foo;)V");
    assert_eq!(args, &[Reg(0)]);
    assert_eq!(code.instructions[1], Instruction::ReturnVoid);
    assert_eq!(class.methods[1], foo_class().classes[0].methods[1]);
}

#[test]
fn every_kind_of_transform_on_one_class() {
    let vm = loaded_vm();
    let fetch = foo_class().classes[0].methods[1].id.clone();
    let get = MethodRef::new(
        ClassRef::new("pkg/Client"),
        "get",
        "()Ljava/lang/String;".parse().unwrap(),
    );
    let transforms = [
        Transform::from(EntryHook::new(bar(), HookRef::new(hooks(), "onBar"))),
        Transform::from(ExitHook::new(fetch.clone(), HookRef::new(hooks(), "afterFetch"))),
        Transform::DetourVirtualInvoke(DetourInvoke::new(
            fetch,
            get,
            HookRef::new(hooks(), "get"),
        )),
    ];
    Instrumenter::new(&vm, None, &TracingReporter)
        .instrument(&transforms)
        .unwrap();

    let bytes = vm.classes.borrow()["pkg/Foo"].clone();
    let dex = decode(&bytes, "pkg/Foo").unwrap();
    let code = dex.classes[0].methods[1].code.as_ref().unwrap();
    let invoked: Vec<_> = code
        .instructions
        .iter()
        .filter_map(|it| match it {
            Instruction::Invoke { method, .. } => Some(method.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(
        invoked,
        [
            "pkg/Hook.get(Lpkg/Client;)Ljava/lang/String;",
            "pkg/Hook.afterFetch(Ljava/lang/String;)Ljava/lang/String;",
        ]
    );
}

#[test]
fn cached_classes_are_redefined_on_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let transforms = [Transform::from(EntryHook::new(
        bar(),
        HookRef::new(hooks(), "onBar"),
    ))];

    let first = loaded_vm();
    let cache = TransformCache::create(dir.path()).unwrap();
    Instrumenter::new(&first, Some(cache.clone()), &TracingReporter)
        .instrument(&transforms)
        .unwrap();

    let second = loaded_vm();
    let report = Instrumenter::new(&second, Some(cache), &TracingReporter)
        .instrument(&transforms)
        .unwrap();
    assert_eq!(report.outcome("pkg/Foo"), Some(&ClassOutcome::Redefined));
    assert_eq!(
        second.classes.borrow()["pkg/Foo"],
        first.classes.borrow()["pkg/Foo"]
    );
}
