//! Programmatic `ClassFile` construction for unit tests.

use crate::classfile::insn::op;
use crate::classfile::{
    ClassFile, Code, Constant, DynamicCall, FieldInfo, InnerClassInfo, Insn, LocalVariable,
    MemberRef, MethodHandle, MethodInfo, Operand, access,
};

pub(crate) struct ClassBuilder {
    file: ClassFile,
}

impl ClassBuilder {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            file: ClassFile {
                minor_version: 0,
                major_version: 52,
                access_flags: access::PUBLIC | 0x0020,
                this_class: name.to_string(),
                super_class: Some("java/lang/Object".to_string()),
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                signature: None,
                source_file: None,
                inner_classes: Vec::new(),
                enclosing_class: None,
            },
        }
    }

    pub(crate) fn access(mut self, flags: u16) -> Self {
        self.file.access_flags = flags;
        self
    }

    pub(crate) fn super_class(mut self, name: &str) -> Self {
        self.file.super_class = Some(name.to_string());
        self
    }

    pub(crate) fn interface(mut self, name: &str) -> Self {
        self.file.interfaces.push(name.to_string());
        self
    }

    pub(crate) fn outer(mut self, name: &str) -> Self {
        self.file.inner_classes.push(InnerClassInfo {
            inner_class: self.file.this_class.clone(),
            outer_class: Some(name.to_string()),
            inner_name: None,
            access_flags: 0,
        });
        self
    }

    pub(crate) fn field(mut self, name: &str, desc: &str, flags: u16) -> Self {
        self.file.fields.push(FieldInfo {
            access_flags: flags,
            name: name.to_string(),
            descriptor: desc.to_string(),
            signature: None,
            constant_value: None,
        });
        self
    }

    pub(crate) fn constant_field(mut self, name: &str, desc: &str, flags: u16, value: Constant) -> Self {
        self = self.field(name, desc, flags);
        if let Some(field) = self.file.fields.last_mut() {
            field.constant_value = Some(value);
        }
        self
    }

    /// Adds a method with a body; an empty body becomes a single `return`.
    pub(crate) fn method(
        mut self,
        name: &str,
        desc: &str,
        flags: u16,
        body: impl FnOnce(&mut CodeBuilder),
    ) -> Self {
        let mut code = CodeBuilder::default();
        body(&mut code);
        self.file.methods.push(MethodInfo {
            access_flags: flags,
            name: name.to_string(),
            descriptor: desc.to_string(),
            signature: None,
            exceptions: Vec::new(),
            code: Some(code.build()),
        });
        self
    }

    pub(crate) fn abstract_method(mut self, name: &str, desc: &str, flags: u16) -> Self {
        self.file.methods.push(MethodInfo {
            access_flags: flags | access::ABSTRACT,
            name: name.to_string(),
            descriptor: desc.to_string(),
            signature: None,
            exceptions: Vec::new(),
            code: None,
        });
        self
    }

    pub(crate) fn build(self) -> ClassFile {
        self.file
    }
}

#[derive(Default)]
pub(crate) struct CodeBuilder {
    insns: Vec<Insn>,
    offset: u32,
    locals: Vec<LocalVariable>,
}

impl CodeBuilder {
    fn push(&mut self, opcode: u8, operand: Operand, size: u32) -> &mut Self {
        self.insns.push(Insn {
            offset: self.offset,
            opcode,
            operand,
        });
        self.offset += size;
        self
    }

    pub(crate) fn op(&mut self, opcode: u8) -> &mut Self {
        self.push(opcode, Operand::None, 1)
    }

    pub(crate) fn push_int(&mut self, value: i32) -> &mut Self {
        self.push(op::SIPUSH, Operand::Int(value), 3)
    }

    pub(crate) fn ldc(&mut self, constant: Constant) -> &mut Self {
        self.push(op::LDC, Operand::Ldc(constant), 3)
    }

    pub(crate) fn var(&mut self, opcode: u8, slot: u16) -> &mut Self {
        self.push(opcode, Operand::Var(slot), 2)
    }

    /// Branch to the instruction with index `target`.
    pub(crate) fn jump(&mut self, opcode: u8, target: usize) -> &mut Self {
        self.push(opcode, Operand::Jump(target), 3)
    }

    pub(crate) fn type_insn(&mut self, opcode: u8, name: &str) -> &mut Self {
        self.push(opcode, Operand::Type(name.to_string()), 3)
    }

    pub(crate) fn field_insn(&mut self, opcode: u8, owner: &str, name: &str, desc: &str) -> &mut Self {
        let member = member(owner, name, desc, false);
        self.push(opcode, Operand::Field(member), 3)
    }

    pub(crate) fn invoke(&mut self, opcode: u8, owner: &str, name: &str, desc: &str) -> &mut Self {
        let interface = opcode == op::INVOKEINTERFACE;
        let size = if interface { 5 } else { 3 };
        self.push(opcode, Operand::Method(member(owner, name, desc, interface)), size)
    }

    /// `invokedynamic` through `LambdaMetafactory.metafactory` targeting `owner.name desc`.
    pub(crate) fn lambda(&mut self, iface_name: &str, owner: &str, name: &str, desc: &str) -> &mut Self {
        let call = DynamicCall {
            name: iface_name.to_string(),
            descriptor: "()Ljava/lang/Runnable;".to_string(),
            bootstrap: MethodHandle {
                kind: 6,
                owner: "java/lang/invoke/LambdaMetafactory".to_string(),
                name: "metafactory".to_string(),
                descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;".to_string(),
                interface: false,
            },
            args: vec![
                Constant::MethodType("()V".to_string()),
                Constant::MethodHandle(MethodHandle {
                    kind: 6,
                    owner: owner.to_string(),
                    name: name.to_string(),
                    descriptor: desc.to_string(),
                    interface: false,
                }),
                Constant::MethodType("()V".to_string()),
            ],
        };
        self.push(op::INVOKEDYNAMIC, Operand::Dynamic(call), 5)
    }

    pub(crate) fn local(&mut self, name: &str, desc: &str, index: u16, start: u32, length: u32) -> &mut Self {
        self.locals.push(LocalVariable {
            start_pc: start,
            length,
            name: name.to_string(),
            descriptor: desc.to_string(),
            index,
        });
        self
    }

    fn build(mut self) -> Code {
        if self.insns.is_empty() {
            self.op(op::RETURN);
        }
        let code_length = self.offset;
        // locals declared with a zero length span the whole body
        for local in &mut self.locals {
            if local.length == 0 {
                local.length = code_length - local.start_pc;
            }
        }
        Code {
            max_stack: 4,
            max_locals: 8,
            code_length,
            insns: self.insns,
            handlers: Vec::new(),
            local_vars: self.locals,
        }
    }
}

fn member(owner: &str, name: &str, desc: &str, interface: bool) -> MemberRef {
    MemberRef {
        owner: owner.to_string(),
        name: name.to_string(),
        descriptor: desc.to_string(),
        interface,
    }
}
