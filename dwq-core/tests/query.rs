//! DWARF入力なしで評価できるクエリの端から端までのテスト

use dwq_core::{Query, Stack};

/// プログラムを空のスタックで評価し、各結果スタックを上から順の
/// 表示文字列にする
fn eval(program: &str) -> Vec<Vec<String>> {
    let voc = dwq_core::vocabulary();
    let mut query = Query::compile(program, &voc).expect("compile failed");
    let results = query.run(Stack::new()).expect("query failed");
    results
        .iter()
        .map(|stk| stk.values().iter().rev().map(|v| v.show()).collect())
        .collect()
}

fn single(rows: &[&str]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| vec![row.to_string()])
        .collect()
}

#[test]
fn test_seq_concat() {
    assert_eq!(eval("[1, 2, 3] [4, 5, 6] add"), single(&["[1, 2, 3, 4, 5, 6]"]));
}

#[test]
fn test_seq_length() {
    assert_eq!(eval("[1, 2, 3] length"), single(&["3"]));
}

#[test]
fn test_str_find_keeps_both() {
    assert_eq!(
        eval("\"foobar\" \"oba\" ?find"),
        vec![vec!["oba".to_string(), "foobar".to_string()]]
    );
    assert_eq!(eval("\"foobar\" \"xyz\" ?find"), Vec::<Vec<String>>::new());
}

#[test]
fn test_aset_union_length() {
    assert_eq!(eval("0 0x10 aset 0x100 0x110 aset add length"), single(&["32"]));
}

#[test]
fn test_aset_range_and_elem() {
    assert_eq!(
        eval("0 0x10 aset 0x100 0x110 aset add range"),
        single(&["[0x0, 0x10)", "[0x100, 0x110)"])
    );
    assert_eq!(eval("0 3 aset elem"), single(&["0x0", "0x1", "0x2"]));
    assert_eq!(eval("0 3 aset relem"), single(&["0x2", "0x1", "0x0"]));
}

#[test]
fn test_aset_sub_and_contains() {
    assert_eq!(
        eval("0 0x20 aset 0x10 sub range"),
        single(&["[0x0, 0x10)", "[0x11, 0x20)"])
    );
    assert_eq!(eval("0 10 aset 9 ?contains drop length"), single(&["10"]));
    assert_eq!(
        eval("0 10 aset 10 ?contains drop length"),
        Vec::<Vec<String>>::new()
    );
}

#[test]
fn test_shuffles() {
    assert_eq!(eval("1 2 swap"), vec![vec!["1".to_string(), "2".to_string()]]);
    assert_eq!(eval("1 dup"), vec![vec!["1".to_string(), "1".to_string()]]);
    assert_eq!(eval("1 2 drop"), single(&["1"]));
    assert_eq!(
        eval("1 2 over"),
        vec![vec!["1".to_string(), "2".to_string(), "1".to_string()]]
    );
    assert_eq!(
        eval("1 2 3 rot"),
        vec![vec!["1".to_string(), "3".to_string(), "2".to_string()]]
    );
}

#[test]
fn test_alternation_order() {
    assert_eq!(eval("(1, 2, 3)"), single(&["1", "2", "3"]));
}

#[test]
fn test_alternation_two_rounds() {
    // merge は失敗するまで分岐に留まる。2本目の上流スタックは
    // その時点の分岐から先に流れる
    assert_eq!(eval("(1, 2) (10, 20) add"), single(&["11", "21", "22", "12"]));
}

#[test]
fn test_or_takes_first_producing_branch() {
    assert_eq!(eval("(1 || 2)"), single(&["1"]));
    assert_eq!(eval("(?(1 2 ?gt) 10 || 20)"), single(&["20"]));
}

#[test]
fn test_ifelse() {
    assert_eq!(eval("if 1 2 ?lt then 10 else 20"), single(&["10"]));
    assert_eq!(eval("if 1 2 ?gt then 10 else 20"), single(&["20"]));
    assert_eq!(eval("if 1 then 2"), single(&["2"]));
}

#[test]
fn test_capture_collects_tops() {
    assert_eq!(
        eval("1 [()]"),
        vec![vec!["[1]".to_string(), "1".to_string()]]
    );
    assert_eq!(eval("[(1, 2, 3)] length"), single(&["3"]));
}

#[test]
fn test_capture_of_barren_subprogram() {
    // 部分式が何も産出しなければ空の列になる
    assert_eq!(
        eval("1 [?(2 3 ?gt)]"),
        vec![vec!["[]".to_string(), "1".to_string()]]
    );
}

#[test]
fn test_subexpression_asserts() {
    assert_eq!(eval("1 ?(2 ?lt)"), single(&["1"]));
    assert_eq!(eval("3 ?(2 ?lt)"), Vec::<Vec<String>>::new());
    assert_eq!(eval("1 !(2 ?eq)"), single(&["1"]));
    assert_eq!(eval("2 !(2 ?eq)"), Vec::<Vec<String>>::new());
}

#[test]
fn test_infix_compare() {
    assert_eq!(eval("(1, 2, 3) (== 2)"), single(&["2"]));
    assert_eq!(eval("(1, 2, 3) (!= 2)"), single(&["1", "3"]));
    assert_eq!(eval("(1, 2, 3) (>= 2)"), single(&["2", "3"]));
}

#[test]
fn test_pos_word() {
    assert_eq!(eval("[10, 20, 30] elem (pos == 1)"), single(&["20"]));
}

#[test]
fn test_tr_closure_dedups() {
    // 本体がスタックを変えないなら1度だけ
    assert_eq!(eval("1 (dup drop)*"), single(&["1"]));
    assert_eq!(eval("1 (dup drop)+"), single(&["1"]));
}

#[test]
fn test_tr_closure_star_includes_input() {
    assert_eq!(eval("0 (1 add ?(3 ?lt))*"), single(&["0", "1", "2"]));
    assert_eq!(eval("0 (1 add ?(3 ?lt))+"), single(&["1", "2"]));
}

#[test]
fn test_maybe_postfix() {
    assert_eq!(
        eval("1 2?"),
        vec![
            vec!["2".to_string(), "1".to_string()],
            vec!["1".to_string()],
        ]
    );
}

#[test]
fn test_let_preserves_stack() {
    assert_eq!(
        eval("1 let A B := 2 3; A B"),
        vec![vec!["3".to_string(), "2".to_string(), "1".to_string()]]
    );
}

#[test]
fn test_let_iterates_value_program() {
    assert_eq!(eval("let A := (1, 2); A A add"), single(&["2", "4"]));
}

#[test]
fn test_formals_bind_from_stack() {
    assert_eq!(
        eval("1 2 [|A B| A B add]"),
        vec![vec!["[3]".to_string(), "2".to_string(), "1".to_string()]]
    );
}

#[test]
fn test_closure_application() {
    // 変数読みはクロージャを自動適用する
    assert_eq!(eval("let D := {2 mul}; 5 D"), single(&["10"]));
    // apply 語での明示適用
    assert_eq!(eval("5 {2 mul} apply"), single(&["10"]));
}

#[test]
fn test_closure_captures_environment() {
    assert_eq!(eval("let N := 3; let F := {N add}; 10 F"), single(&["13"]));
}

#[test]
fn test_format_consumes_in_stack_order() {
    assert_eq!(eval("1 2 \"%s-%s\""), single(&["1-2"]));
    assert_eq!(eval("7 \"v=%s\""), single(&["v=7"]));
    assert_eq!(
        eval("1 \"yep\""),
        vec![vec!["yep".to_string(), "1".to_string()]]
    );
}

#[test]
fn test_format_interpolation_runs_program() {
    assert_eq!(eval("3 \"%( 2 mul %)!\""), single(&["6!"]));
}

#[test]
fn test_string_ops() {
    assert_eq!(eval("\"foo\" \"bar\" add"), single(&["foobar"]));
    assert_eq!(eval("\"foobar\" length"), single(&["6"]));
    assert_eq!(eval("[\"ab\" elem]"), single(&["[a, b]"]));
    assert_eq!(
        eval("\"foobar\" \"foo.*\" ?match"),
        vec![vec!["foo.*".to_string(), "foobar".to_string()]]
    );
    assert_eq!(eval("\"foobar\" \"o.b\" ?match"), Vec::<Vec<String>>::new());
    assert_eq!(eval("\"foobar\" \"foo\" ?starts drop length"), single(&["6"]));
    assert_eq!(eval("\"foobar\" \"bar\" ?ends drop length"), single(&["6"]));
}

#[test]
fn test_arith() {
    assert_eq!(eval("5 3 sub"), single(&["2"]));
    assert_eq!(eval("6 7 mul"), single(&["42"]));
    assert_eq!(eval("17 5 div"), single(&["3"]));
    assert_eq!(eval("17 5 mod"), single(&["2"]));
    assert_eq!(eval("0x10 0x10 mul"), single(&["0x100"]));
    // ゼロ割は報告してスタックを捨てる
    assert_eq!(eval("1 0 div"), Vec::<Vec<String>>::new());
}

#[test]
fn test_big_integers() {
    assert_eq!(
        eval("0xffffffffffffffff 1 add"),
        single(&["18446744073709551616"])
    );
    assert_eq!(
        eval("0x10000000000000000 0x10000000000000000 mul"),
        single(&["0x100000000000000000000000000000000"])
    );
}

#[test]
fn test_type_word() {
    assert_eq!(
        eval("[[], 2, \"yes\"] elem type"),
        vec![
            vec!["T_SEQ".to_string(), "[]".to_string()],
            vec!["T_CONST".to_string(), "2".to_string()],
            vec!["T_STR".to_string(), "yes".to_string()],
        ]
    );
}

#[test]
fn test_empty_pred() {
    assert_eq!(eval("[] ?empty"), single(&["[]"]));
    assert_eq!(eval("[1] ?empty"), Vec::<Vec<String>>::new());
    assert_eq!(eval("\"\" ?empty"), single(&[""]));
}

#[test]
fn test_seq_find_starts_ends() {
    assert_eq!(eval("[1, 2, 3] [2, 3] ?find drop length"), single(&["3"]));
    assert_eq!(eval("[1, 2, 3] [3, 2] ?find"), Vec::<Vec<String>>::new());
    assert_eq!(eval("[1, 2, 3] [1] ?starts drop length"), single(&["3"]));
    assert_eq!(eval("[1, 2, 3] [3] ?ends drop length"), single(&["3"]));
}

#[test]
fn test_unknown_word_is_build_error() {
    let voc = dwq_core::vocabulary();
    assert!(Query::compile("no_such_word", &voc).is_err());
}

#[test]
fn test_duplicate_binding_is_build_error() {
    let voc = dwq_core::vocabulary();
    assert!(Query::compile("let A := 1; let A := 2; A", &voc).is_err());
}

#[test]
fn test_rerun_reproduces_outputs() {
    let voc = dwq_core::vocabulary();
    let mut query = Query::compile("(1, 2) (10, 20) add", &voc).expect("compile failed");
    let first: Vec<_> = query
        .run(Stack::new())
        .expect("query failed")
        .iter()
        .map(|s| s.values().iter().map(|v| v.show()).collect::<Vec<_>>())
        .collect();
    let second: Vec<_> = query
        .run(Stack::new())
        .expect("query failed")
        .iter()
        .map(|s| s.values().iter().map(|v| v.show()).collect::<Vec<_>>())
        .collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
}

#[test]
fn test_true_false_constants() {
    assert_eq!(eval("true"), single(&["true"]));
    assert_eq!(eval("false"), single(&["false"]));
    assert_eq!(eval("true true ?eq length"), Vec::<Vec<String>>::new());
}

#[test]
fn test_dw_constants_have_domains() {
    assert_eq!(eval("DW_TAG_subprogram"), single(&["DW_TAG_subprogram"]));
    assert_eq!(eval("DW_AT_name"), single(&["DW_AT_name"]));
    assert_eq!(eval("DW_FORM_ref4"), single(&["DW_FORM_ref4"]));
    // 記号ドメイン同士は同一ドメインなら等しい
    assert_eq!(
        eval("DW_TAG_subprogram DW_TAG_subprogram ?eq drop"),
        single(&["DW_TAG_subprogram"])
    );
    // 素な数値とは等しくない
    assert_eq!(eval("DW_TAG_subprogram 0x2e ?eq"), Vec::<Vec<String>>::new());
}
