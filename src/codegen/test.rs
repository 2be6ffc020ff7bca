use pretty_assertions::assert_eq;

use super::function::instance_label;
use super::statement::pack_words;
use super::*;
use crate::parser::parse_file;
use crate::source::SourceMap;
use crate::validation::validate;

fn compile_with(text: &str, options: CodegenOptions) -> Result<String, Error> {
    let mut sources = SourceMap::new();
    sources.insert("test.al", text);
    let block = parse_file(&mut sources, "test.al").expect("program should parse");
    validate(&block).expect("program should validate");
    generate(&block, &options)
}

fn compile(text: &str) -> String {
    compile_with(text, CodegenOptions::default()).expect("program should compile")
}

#[test]
fn test_header_and_entry_point() {
    let asm = compile("def n int; n := 1");
    assert!(asm.starts_with("; generated by aliaslang\nextern free\nextern malloc\nglobal main\nsection .text\nmain:\npush ebp\nmov ebp, esp\n"));
    assert!(asm.ends_with("add esp, 4\nmov eax, 0\nleave\nret\n"));
}

#[test]
fn test_alloc_store_and_free() {
    let asm = compile("def p ptr; p := alloc(4); p <- 7; free(p)");
    assert!(asm.contains("push dword 16\ncall malloc\nadd esp, 4\nmov [esp - 4], eax\n"));
    assert!(asm.contains("mov eax, [esp - 4]\nmov [ebp - 4], eax\n"));
    assert!(asm.contains("mov dword [esp - 4], 7\nmov eax, [esp - 4]\nmov ebx, [ebp - 4]\nmov [ebx], eax\n"));
    assert!(asm.contains("push eax\ncall free\nadd esp, 4\n"));
}

#[test]
fn test_pointer_offsets_are_scaled() {
    let asm = compile("def p ptr; def q ptr; p := alloc(4); q := p + 3; free(p)");
    assert!(asm.contains("mov dword [esp - 4], 3\nshl dword [esp - 4], 2\nadd esp, 4\n"));

    let asm = compile("def n int; n := n + 3");
    assert!(!asm.contains("shl"));
}

#[test]
fn test_binary_spill_slot() {
    let asm = compile("def a int; def b int; a := a - b");
    let expected = "\
mov eax, [ebp - 4]
mov [esp - 4], eax
sub esp, 4
mov eax, [ebp - 8]
mov [esp - 4], eax
add esp, 4
mov eax, [esp - 4]
sub eax, [esp - 8]
mov [esp - 4], eax
";
    assert!(asm.contains(expected), "{}", asm);
}

#[test]
fn test_comparisons_and_division() {
    let asm = compile("def a int; a := a < 2; a := a = 3; a := a / 2");
    assert!(asm.contains("cmp eax, [esp - 8]\nsetl al\nmovzx eax, al\n"));
    assert!(asm.contains("cmp eax, [esp - 8]\nsete al\nmovzx eax, al\n"));
    assert!(asm.contains("cdq\nidiv dword [esp - 8]\n"));
}

#[test]
fn test_string_words() {
    assert_eq!(pack_words("abcde"), vec![0x6463_6261, 0x65]);
    assert_eq!(pack_words(""), vec![0]);

    let asm = compile("def p ptr; p := alloc(2); p <- \"hi!\"; free(p)");
    assert!(asm.contains("mov ebx, [ebp - 4]\nmov dword [ebx + 0], 0x00216968\n"));
}

#[test]
fn test_control_flow_labels() {
    let asm = compile("def c int; if (c) { c := 1 } else { c := 2 } while (c) { c := c - 1 }");
    assert!(asm.contains("cmp dword [esp - 4], 0\nje _if_else0\n"));
    assert!(asm.contains("jmp _if_end0\n_if_else0:\n"));
    assert!(asm.contains("_while1:\n"));
    assert!(asm.contains("je _while_end1\n"));
    assert!(asm.contains("jmp _while1\n_while_end1:\n"));
}

#[test]
fn test_block_releases_locals() {
    let asm = compile("{ def a int; def b int } def c int");
    assert!(asm.contains("sub esp, 4\n; def b\nsub esp, 4\nadd esp, 8\n"));
}

#[test]
fn test_asm_and_assumptions() {
    let asm = compile("asm \"nop\"; def p ptr; def q ptr; p := alloc(2); q := p; assume (q = p); free(p)");
    assert!(asm.contains("; asm\nnop\n"));
    assert!(!asm.contains("; assume"));

    let asm = compile("def p ptr; def q ptr; p := alloc(2); q := p + 1; assume (q = p + 1) { q <- 0 } free(p)");
    assert!(asm.contains("; assume"));
    assert!(asm.contains("je _assume_end0\n"));
}

#[test]
fn test_function_call_copies_arguments_back() {
    let asm = compile("func f(p ptr[1]) { p <- 1 } def a ptr; a := alloc(1); call f(a); free(a)");
    assert!(asm.contains("push dword [ebp - 4]\ncall _fun0\nadd esp, 4\nmov eax, [esp - 4]\nmov [ebp - 4], eax\n"));
    let main = asm.find("main:").unwrap();
    let function = asm.find("_fun0:").unwrap();
    assert!(main < function);
    assert!(asm.contains("_fun0:\npush ebp\nmov ebp, esp\n"));
    assert!(asm.contains("mov ebx, [ebp + 8]\nmov [ebx], eax\n"));
}

#[test]
fn test_arguments_pushed_right_to_left() {
    let asm = compile("func g(a int, b int) { } def x int; def y int; call g(x, y)");
    assert!(asm.contains("push dword [ebp - 8]\npush dword [ebp - 4]\ncall _fun0\nadd esp, 8\n"));
    assert!(asm.contains("mov eax, [esp - 8]\nmov [ebp - 4], eax\nmov eax, [esp - 4]\nmov [ebp - 8], eax\n"));
}

#[test]
fn test_generic_functions_are_monomorphised() {
    let program = "
        func clear[N](p ptr[N]) { p <- N }
        def a ptr
        def b ptr
        a := alloc(2)
        b := alloc(3)
        call clear[2](a)
        call clear[2](a)
        call clear[3](b)
        free(a)
        free(b)
    ";
    let asm = compile(program);
    assert_eq!(asm.matches("_fun0_2:").count(), 1);
    assert_eq!(asm.matches("_fun0_3:").count(), 1);
    assert_eq!(asm.matches("call _fun0_2\n").count(), 2);
    assert!(asm.contains("_fun0_3:\npush ebp\nmov ebp, esp\n; p <-\nmov dword [esp - 4], 3\n"));
}

#[test]
fn test_instance_labels() {
    assert_eq!(instance_label(3, &[]), "_fun3");
    assert_eq!(instance_label(3, &[4, -1]), "_fun3_4_m1");
}

#[test]
fn test_prototypes_are_external() {
    let asm = compile("proto puts(const s ptr[1]) def a ptr; a := alloc(1); a <- 0; call puts(a); free(a)");
    assert!(asm.contains("extern puts\n"));
    assert!(asm.contains("call puts\nadd esp, 4\n; free\n"));
}

#[test]
fn test_external_function_without_main() {
    let options = CodegenOptions { top_main: false };
    let asm = compile_with("func ^entry(n int) { n := n + 1 }", options).unwrap();
    assert!(asm.contains("global entry\n"));
    assert!(asm.contains("_fun0:\nentry:\npush ebp\n"));
    assert!(!asm.contains("main:"));
}

#[test]
fn test_external_main_clashes_with_entry_point() {
    let error = compile_with("func ^main() { }", CodegenOptions::default()).unwrap_err();
    assert_eq!(error.kind, ErrorKind::Codegen);
    assert!(compile_with("func ^main() { }", CodegenOptions { top_main: false }).is_ok());
}
