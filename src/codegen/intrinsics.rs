//! Operators that compile to a handful of instructions instead of a call.
//! Every emitter leaves its result in `%rax` and may clobber `%rdx`.

use phf::phf_map;

/// Emits assembly lines for one intrinsic. `args` are already formatted
/// operands, stack slots in practice.
pub type IntrinsicFn = fn(args: &[String], out: &mut Vec<String>);

pub static INTRINSICS: phf::Map<&'static str, IntrinsicFn> = phf_map! {
    "+" => (|args, out| binary("addq", args, out)) as IntrinsicFn,
    "-" => (|args, out| binary("subq", args, out)) as IntrinsicFn,
    "*" => (|args, out| binary("imulq", args, out)) as IntrinsicFn,
    "/" => (division as IntrinsicFn),
    "%" => (remainder as IntrinsicFn),
    "==" => (|args, out| compare("sete", args, out)) as IntrinsicFn,
    "!=" => (|args, out| compare("setne", args, out)) as IntrinsicFn,
    "<" => (|args, out| compare("setl", args, out)) as IntrinsicFn,
    "<=" => (|args, out| compare("setle", args, out)) as IntrinsicFn,
    ">" => (|args, out| compare("setg", args, out)) as IntrinsicFn,
    ">=" => (|args, out| compare("setge", args, out)) as IntrinsicFn,
    "and" => (|args, out| binary("andq", args, out)) as IntrinsicFn,
    "or" => (|args, out| binary("orq", args, out)) as IntrinsicFn,
    "unary_-" => (negate as IntrinsicFn),
    "unary_not" => (logical_not as IntrinsicFn),
};

fn binary(op: &str, args: &[String], out: &mut Vec<String>) {
    out.push(format!("movq {}, %rax", args[0]));
    out.push(format!("{op} {}, %rax", args[1]));
}

fn compare(set: &str, args: &[String], out: &mut Vec<String>) {
    // xor first: set* writes only the low byte.
    out.push("xor %eax, %eax".to_owned());
    out.push(format!("movq {}, %rdx", args[0]));
    out.push(format!("cmpq {}, %rdx", args[1]));
    out.push(format!("{set} %al"));
}

fn division(args: &[String], out: &mut Vec<String>) {
    out.push(format!("movq {}, %rax", args[0]));
    out.push("cqto".to_owned());
    out.push(format!("idivq {}", args[1]));
}

fn remainder(args: &[String], out: &mut Vec<String>) {
    division(args, out);
    out.push("movq %rdx, %rax".to_owned());
}

fn negate(args: &[String], out: &mut Vec<String>) {
    out.push(format!("movq {}, %rax", args[0]));
    out.push("negq %rax".to_owned());
}

fn logical_not(args: &[String], out: &mut Vec<String>) {
    out.push(format!("movq {}, %rax", args[0]));
    out.push("xorq $1, %rax".to_owned());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str, args: &[&str]) -> Vec<String> {
        let args: Vec<String> = args.iter().map(|s| (*s).to_owned()).collect();
        let mut out = Vec::new();
        INTRINSICS[name](&args, &mut out);
        out
    }

    #[test]
    fn addition_accumulates_in_rax() {
        assert_eq!(
            run("+", &["-8(%rbp)", "-16(%rbp)"]),
            ["movq -8(%rbp), %rax", "addq -16(%rbp), %rax"]
        );
    }

    #[test]
    fn comparison_zeroes_before_setting() {
        assert_eq!(
            run("<", &["-8(%rbp)", "-16(%rbp)"]),
            [
                "xor %eax, %eax",
                "movq -8(%rbp), %rdx",
                "cmpq -16(%rbp), %rdx",
                "setl %al",
            ]
        );
    }

    #[test]
    fn remainder_moves_rdx_into_rax() {
        let out = run("%", &["-8(%rbp)", "-16(%rbp)"]);
        assert_eq!(out.last().unwrap(), "movq %rdx, %rax");
        assert!(out.contains(&"cqto".to_owned()));
    }

    #[test]
    fn every_operator_has_an_entry() {
        for op in ["+", "-", "*", "/", "%", "==", "!=", "<", "<=", ">", ">=", "and", "or"] {
            assert!(INTRINSICS.contains_key(op), "missing intrinsic for {op}");
        }
        assert!(INTRINSICS.contains_key("unary_-"));
        assert!(INTRINSICS.contains_key("unary_not"));
    }
}
