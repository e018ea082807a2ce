//! Source wrapping for Python snippets.

/// Runs before the entry function is defined.
///
/// Registers the bridge's attribute-access dict as a mapping type for result
/// conversion and swaps `print` for the host sink in interactive runs.
const HEADER: &str = "\
from __codenode__ import HostDict, to_host_mapping_types
if HostDict not in to_host_mapping_types:
    to_host_mapping_types.append(HostDict)
if print_overwrite:
    print = print_overwrite
";

/// Name of the async entry function.
const ENTRY: &str = "__codenode_main";

/// Global the bridge reads the result from.
pub(crate) const RESULT_GLOBAL: &str = "__codenode_result__";

/// Embed `code` in an async entry function and await it.
///
/// The snippet can therefore `await` and `return` at its top level. Lines
/// are indented by two spaces; an empty snippet becomes `pass`.
pub(crate) fn wrap(code: &str) -> String {
    let mut source = String::with_capacity(HEADER.len() + code.len() * 2 + 64);
    source.push_str(HEADER);
    source.push_str("async def ");
    source.push_str(ENTRY);
    source.push_str("():\n");

    let mut has_code = false;
    for line in code.lines() {
        has_code |= !line.trim().is_empty();
        source.push_str("  ");
        source.push_str(line);
        source.push('\n');
    }
    if !has_code {
        source.push_str("  pass\n");
    }

    source.push_str(RESULT_GLOBAL);
    source.push_str(" = await ");
    source.push_str(ENTRY);
    source.push_str("()\n");
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn indents_snippet_into_async_entry() {
        let wrapped = wrap("x = 1\nif x:\n    return {'x': x}");
        let body = wrapped.strip_prefix(HEADER).unwrap();
        assert_eq!(
            body,
            "async def __codenode_main():\n  x = 1\n  if x:\n      return {'x': x}\n__codenode_result__ = await __codenode_main()\n"
        );
    }

    #[test]
    fn blank_snippet_becomes_pass() {
        let wrapped = wrap("\n   \n");
        assert!(wrapped.contains("async def __codenode_main():\n  \n     \n  pass\n"));
    }

    #[test]
    fn crlf_lines_are_normalised() {
        let wrapped = wrap("a = 1\r\nreturn a\r\n");
        assert!(wrapped.contains("  a = 1\n  return a\n"));
        assert!(!wrapped.contains('\r'));
    }

    #[test]
    fn header_swaps_print_only_when_overwritten() {
        assert!(HEADER.contains("if print_overwrite:\n    print = print_overwrite"));
    }
}
