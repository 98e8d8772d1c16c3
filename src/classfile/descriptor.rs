use super::{ClassFileError, Result};

/// Splits a method descriptor into its argument descriptors and return descriptor.
///
/// `"(I[Ljava/lang/String;J)V"` yields `(["I", "[Ljava/lang/String;", "J"], "V")`.
pub fn split_method_descriptor(desc: &str) -> Result<(Vec<&str>, &str)> {
    let invalid = || ClassFileError::InvalidDescriptor(desc.to_string());
    let body = desc.strip_prefix('(').ok_or_else(invalid)?;
    let close = body.find(')').ok_or_else(invalid)?;
    let (params, ret) = (&body[..close], &body[close + 1..]);

    let mut args = Vec::new();
    let mut rest = params;
    while !rest.is_empty() {
        let len = field_descriptor_len(rest).ok_or_else(invalid)?;
        args.push(&rest[..len]);
        rest = &rest[len..];
    }

    if ret != "V" && field_descriptor_len(ret) != Some(ret.len()) {
        return Err(invalid());
    }

    Ok((args, ret))
}

/// Validates a single field descriptor.
pub fn check_field_descriptor(desc: &str) -> Result<()> {
    if field_descriptor_len(desc) == Some(desc.len()) {
        Ok(())
    } else {
        Err(ClassFileError::InvalidDescriptor(desc.to_string()))
    }
}

/// Length of the leading field descriptor in `input`, if well formed.
fn field_descriptor_len(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut dims = 0;
    while bytes.get(dims) == Some(&b'[') {
        dims += 1;
    }
    match bytes.get(dims)? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => Some(dims + 1),
        b'L' => {
            let end = input[dims..].find(';')?;
            (end > 1).then_some(dims + end + 1)
        }
        _ => None,
    }
}

/// Local-variable slots an argument of this descriptor occupies.
pub fn slot_size(desc: &str) -> u16 {
    if desc == "J" || desc == "D" { 2 } else { 1 }
}

pub fn is_primitive(desc: &str) -> bool {
    desc.len() == 1 && "BCDFIJSZV".contains(desc)
}

/// Converts an internal name (`java/lang/String`, `[I`) to a type descriptor.
pub fn internal_name_to_descriptor(name: &str) -> String {
    if name.starts_with('[') {
        name.to_string()
    } else {
        format!("L{name};")
    }
}

/// Strips array dimensions, returning `(dims, element descriptor)`.
pub fn array_element(desc: &str) -> (usize, &str) {
    let dims = desc.bytes().take_while(|b| *b == b'[').count();
    (dims, &desc[dims..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_method_descriptor_basic() {
        let (args, ret) = split_method_descriptor("(I[Ljava/lang/String;J)V").unwrap();
        assert_eq!(args, vec!["I", "[Ljava/lang/String;", "J"]);
        assert_eq!(ret, "V");

        let (args, ret) = split_method_descriptor("()[[D").unwrap();
        assert!(args.is_empty());
        assert_eq!(ret, "[[D");
    }

    #[test]
    fn split_method_descriptor_rejects_garbage() {
        assert!(split_method_descriptor("I)V").is_err());
        assert!(split_method_descriptor("(Q)V").is_err());
        assert!(split_method_descriptor("(L;)V").is_err());
        assert!(split_method_descriptor("()").is_err());
        assert!(check_field_descriptor("Ljava/lang/Object").is_err());
    }

    #[test]
    fn array_helpers() {
        assert_eq!(array_element("[[Lfoo/Bar;"), (2, "Lfoo/Bar;"));
        assert_eq!(internal_name_to_descriptor("foo/Bar"), "Lfoo/Bar;");
        assert_eq!(internal_name_to_descriptor("[I"), "[I");
        assert_eq!(slot_size("J"), 2);
        assert_eq!(slot_size("Ljava/lang/Long;"), 1);
    }
}
