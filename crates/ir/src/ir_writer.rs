use std::io;

use crate::{
    inst::{CallData, CallTarget, InstData},
    module::{FuncRef, Module},
    BlockId, Function, InstId, Value, ValueId,
};

pub struct FuncWriter<'a> {
    module: &'a Module,
    func: &'a Function,
    level: u8,
}

impl<'a> FuncWriter<'a> {
    pub fn new(module: &'a Module, func_ref: FuncRef) -> Self {
        Self {
            module,
            func: &module.funcs[func_ref],
            level: 0,
        }
    }

    pub fn write(&mut self, mut w: impl io::Write) -> io::Result<()> {
        let sig = &self.func.sig;
        write!(w, "func {} %{}(", sig.linkage(), sig.name())?;
        let mut args = self.func.arg_values.iter().peekable();
        while let Some(arg) = args.next() {
            self.write_value_with_ty(*arg, &mut w)?;
            if args.peek().is_some() {
                w.write_all(b", ")?;
            }
        }
        write!(w, ") -> {}", sig.ret_ty())?;

        self.enter_item(&mut w)?;
        for block in self.func.layout.iter_block() {
            self.write_block_with_inst(block, &mut w)?;
            self.newline(&mut w)?;
        }
        self.leave_item();

        Ok(())
    }

    pub fn dump_string(&mut self) -> io::Result<String> {
        let mut s = Vec::new();
        self.write(&mut s)?;
        String::from_utf8(s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn write_value(&self, value: ValueId, mut w: impl io::Write) -> io::Result<()> {
        match self.func.dfg.value(value) {
            Value::Immediate { imm, ty } => write!(w, "{imm}.{ty}"),
            _ => write!(w, "{value}"),
        }
    }

    fn write_value_with_ty(&self, value: ValueId, mut w: impl io::Write) -> io::Result<()> {
        write!(w, "{value}.{}", self.func.dfg.value_ty(value))
    }

    fn write_block_with_inst(&mut self, block: BlockId, mut w: impl io::Write) -> io::Result<()> {
        self.indent(&mut w)?;
        write!(w, "{block}")?;

        self.enter_item(&mut w)?;
        for inst in self.func.layout.iter_inst(block) {
            self.indent(&mut w)?;
            self.write_inst(inst, &mut w)?;
            w.write_all(b";")?;
            self.newline(&mut w)?;
        }
        self.leave_item();

        Ok(())
    }

    fn write_inst(&self, inst: InstId, mut w: impl io::Write) -> io::Result<()> {
        use InstData::*;

        if let Some(ret_val) = self.func.dfg.inst_result(inst) {
            self.write_value_with_ty(ret_val, &mut w)?;
            w.write_all(b" = ")?;
        }

        match self.func.dfg.inst(inst) {
            Alloca { ty, count } => {
                write!(w, "alloca {ty}")?;
                if let Some(count) = count {
                    self.write_inst_args(&[*count], &mut w)?;
                }
            }
            Load { addr, .. } => {
                w.write_all(b"load")?;
                self.write_inst_args(&[*addr], &mut w)?;
            }
            Store { addr, value } => {
                w.write_all(b"store")?;
                self.write_inst_args(&[*addr, *value], &mut w)?;
            }
            PtrAdd { base, offset } => {
                w.write_all(b"ptr_add")?;
                self.write_inst_args(&[*base, *offset], &mut w)?;
            }
            ElemPtr {
                base,
                index,
                elem_ty,
            } => {
                write!(w, "elem_ptr {elem_ty}")?;
                self.write_inst_args(&[*base, *index], &mut w)?;
            }
            Cast { code, arg, .. } => {
                write!(w, "{code}")?;
                self.write_inst_args(&[*arg], &mut w)?;
            }
            Binary { code, args } => {
                write!(w, "{code}")?;
                self.write_inst_args(args, &mut w)?;
            }
            Select { args } => {
                w.write_all(b"select")?;
                self.write_inst_args(args, &mut w)?;
            }
            Phi { values, blocks, .. } => {
                w.write_all(b"phi")?;
                for (value, block) in values.iter().zip(blocks.iter()) {
                    w.write_all(b" (")?;
                    self.write_value(*value, &mut w)?;
                    write!(w, " {block})")?;
                }
            }
            Call(call) => {
                self.write_call("call", call, &mut w)?;
            }
            Invoke {
                call,
                normal,
                unwind,
            } => {
                self.write_call("invoke", call, &mut w)?;
                write!(w, " {normal} {unwind}")?;
            }
            MemTransfer {
                code,
                dest,
                src,
                len,
            } => {
                w.write_all(code.as_str().as_bytes())?;
                self.write_inst_args(&[*dest, *src, *len], &mut w)?;
            }
            MemSet { dest, value, len } => {
                w.write_all(b"memset")?;
                self.write_inst_args(&[*dest, *value, *len], &mut w)?;
            }
            Lifetime { code, size, addr } => {
                write!(w, "{} {size}", code.as_str())?;
                self.write_inst_args(&[*addr], &mut w)?;
            }
            VaArg { list, .. } => {
                w.write_all(b"va_arg")?;
                self.write_inst_args(&[*list], &mut w)?;
            }
            Jump { dest } => write!(w, "jump {dest}")?,
            Br { cond, dests } => {
                w.write_all(b"br")?;
                self.write_inst_args(&[*cond], &mut w)?;
                write!(w, " {} {}", dests[0], dests[1])?;
            }
            Return { arg } => {
                w.write_all(b"return")?;
                if let Some(arg) = arg {
                    self.write_inst_args(&[*arg], &mut w)?;
                }
            }
            Unreachable => w.write_all(b"unreachable")?,
        }

        Ok(())
    }

    fn write_call(&self, name: &str, call: &CallData, mut w: impl io::Write) -> io::Result<()> {
        match call.target {
            CallTarget::Direct(callee) => {
                write!(w, "{name} %{}", self.module.global_name(callee))?;
            }
            CallTarget::Indirect(callee) => {
                write!(w, "{name}_indirect")?;
                self.write_inst_args(&[callee], &mut w)?;
            }
        }

        for (arg_no, arg) in call.args.iter().enumerate() {
            w.write_all(b" ")?;
            if let Some(ty) = call.byval_ty(arg_no) {
                write!(w, "byval({ty}) ")?;
            }
            self.write_value(*arg, &mut w)?;
        }
        Ok(())
    }

    fn write_inst_args(&self, args: &[ValueId], mut w: impl io::Write) -> io::Result<()> {
        for arg in args {
            w.write_all(b" ")?;
            self.write_value(*arg, &mut w)?;
        }

        Ok(())
    }

    fn indent(&self, mut w: impl io::Write) -> io::Result<()> {
        w.write_all(" ".repeat(self.level as usize * 4).as_bytes())
    }

    fn newline(&self, mut w: impl io::Write) -> io::Result<()> {
        w.write_all(b"\n")
    }

    fn enter_item(&mut self, mut w: impl io::Write) -> io::Result<()> {
        self.level += 1;
        w.write_all(b":\n")
    }

    fn leave_item(&mut self) {
        self.level -= 1;
    }
}
