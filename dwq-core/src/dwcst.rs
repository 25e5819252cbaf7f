//! DWARF列挙定数の語彙
//!
//! gimliが名前を知っている DW_TAG_* / DW_AT_* / DW_FORM_* / DW_OP_* /
//! DW_ATE_* / DW_LANG_* / DW_INL_* を、それぞれの表示ドメインを持つ
//! 名前付き定数として登録します。タグと属性については `?TAG_*`、
//! `?AT_*`、`@AT_*` の派生語も同時に生やします。

use crate::cst::{Constant, Domain};
use crate::overload::Vocabulary;
use crate::value::Value;

macro_rules! register_tags {
    ($voc:ident, [$($name:ident),* $(,)?]) => {
        $(
            {
                $voc.add_const(
                    stringify!($name),
                    Value::cst(Constant::new(gimli::$name.0, Domain::Tag), 0),
                );
                // "DW_TAG_foo" -> "TAG_foo"
                let base = &stringify!($name)[3..];
                $voc.add_pred_overload(base, crate::dw::tag_die_pred_overload(gimli::$name));
                $voc.add_pred_overload(base, crate::dw::tag_abbrev_pred_overload(gimli::$name));
            }
        )*
    };
}

macro_rules! register_ats {
    ($voc:ident, [$($name:ident),* $(,)?]) => {
        $(
            {
                $voc.add_const(
                    stringify!($name),
                    Value::cst(Constant::new(gimli::$name.0, Domain::At), 0),
                );
                // "DW_AT_foo" -> "AT_foo" と "@AT_foo"
                let base = &stringify!($name)[3..];
                $voc.add_op_overload(
                    &format!("@{}", base),
                    crate::dw::at_word_overload(gimli::$name),
                );
                $voc.add_pred_overload(base, crate::dw::at_die_pred_overload(gimli::$name));
                $voc.add_pred_overload(base, crate::dw::at_attr_pred_overload(gimli::$name));
            }
        )*
    };
}

macro_rules! register_consts {
    ($voc:ident, $dom:expr, [$($name:ident),* $(,)?]) => {
        $(
            $voc.add_const(
                stringify!($name),
                Value::cst(Constant::new(gimli::$name.0, $dom), 0),
            );
        )*
    };
}

/// DWARF定数の語彙を登録する
pub fn register(voc: &mut Vocabulary) {
    register_tags!(
        voc,
        [
            DW_TAG_array_type,
            DW_TAG_class_type,
            DW_TAG_entry_point,
            DW_TAG_enumeration_type,
            DW_TAG_formal_parameter,
            DW_TAG_imported_declaration,
            DW_TAG_label,
            DW_TAG_lexical_block,
            DW_TAG_member,
            DW_TAG_pointer_type,
            DW_TAG_reference_type,
            DW_TAG_compile_unit,
            DW_TAG_string_type,
            DW_TAG_structure_type,
            DW_TAG_subroutine_type,
            DW_TAG_typedef,
            DW_TAG_union_type,
            DW_TAG_unspecified_parameters,
            DW_TAG_variant,
            DW_TAG_common_block,
            DW_TAG_common_inclusion,
            DW_TAG_inheritance,
            DW_TAG_inlined_subroutine,
            DW_TAG_module,
            DW_TAG_ptr_to_member_type,
            DW_TAG_set_type,
            DW_TAG_subrange_type,
            DW_TAG_with_stmt,
            DW_TAG_access_declaration,
            DW_TAG_base_type,
            DW_TAG_catch_block,
            DW_TAG_const_type,
            DW_TAG_constant,
            DW_TAG_enumerator,
            DW_TAG_file_type,
            DW_TAG_friend,
            DW_TAG_namelist,
            DW_TAG_namelist_item,
            DW_TAG_packed_type,
            DW_TAG_subprogram,
            DW_TAG_template_type_parameter,
            DW_TAG_template_value_parameter,
            DW_TAG_thrown_type,
            DW_TAG_try_block,
            DW_TAG_variant_part,
            DW_TAG_variable,
            DW_TAG_volatile_type,
            DW_TAG_dwarf_procedure,
            DW_TAG_restrict_type,
            DW_TAG_interface_type,
            DW_TAG_namespace,
            DW_TAG_imported_module,
            DW_TAG_unspecified_type,
            DW_TAG_partial_unit,
            DW_TAG_imported_unit,
            DW_TAG_condition,
            DW_TAG_shared_type,
            DW_TAG_type_unit,
            DW_TAG_rvalue_reference_type,
            DW_TAG_template_alias,
            DW_TAG_coarray_type,
            DW_TAG_generic_subrange,
            DW_TAG_dynamic_type,
            DW_TAG_atomic_type,
            DW_TAG_call_site,
            DW_TAG_call_site_parameter,
            DW_TAG_skeleton_unit,
            DW_TAG_GNU_call_site,
            DW_TAG_GNU_call_site_parameter,
        ]
    );

    register_ats!(
        voc,
        [
            DW_AT_sibling,
            DW_AT_location,
            DW_AT_name,
            DW_AT_ordering,
            DW_AT_byte_size,
            DW_AT_bit_offset,
            DW_AT_bit_size,
            DW_AT_stmt_list,
            DW_AT_low_pc,
            DW_AT_high_pc,
            DW_AT_language,
            DW_AT_discr,
            DW_AT_discr_value,
            DW_AT_visibility,
            DW_AT_import,
            DW_AT_string_length,
            DW_AT_common_reference,
            DW_AT_comp_dir,
            DW_AT_const_value,
            DW_AT_containing_type,
            DW_AT_default_value,
            DW_AT_inline,
            DW_AT_is_optional,
            DW_AT_lower_bound,
            DW_AT_producer,
            DW_AT_prototyped,
            DW_AT_return_addr,
            DW_AT_start_scope,
            DW_AT_bit_stride,
            DW_AT_upper_bound,
            DW_AT_abstract_origin,
            DW_AT_accessibility,
            DW_AT_address_class,
            DW_AT_artificial,
            DW_AT_base_types,
            DW_AT_calling_convention,
            DW_AT_count,
            DW_AT_data_member_location,
            DW_AT_decl_column,
            DW_AT_decl_file,
            DW_AT_decl_line,
            DW_AT_declaration,
            DW_AT_discr_list,
            DW_AT_encoding,
            DW_AT_external,
            DW_AT_frame_base,
            DW_AT_friend,
            DW_AT_identifier_case,
            DW_AT_macro_info,
            DW_AT_namelist_item,
            DW_AT_priority,
            DW_AT_segment,
            DW_AT_specification,
            DW_AT_static_link,
            DW_AT_type,
            DW_AT_use_location,
            DW_AT_variable_parameter,
            DW_AT_virtuality,
            DW_AT_vtable_elem_location,
            DW_AT_allocated,
            DW_AT_associated,
            DW_AT_data_location,
            DW_AT_byte_stride,
            DW_AT_entry_pc,
            DW_AT_use_UTF8,
            DW_AT_extension,
            DW_AT_ranges,
            DW_AT_trampoline,
            DW_AT_call_column,
            DW_AT_call_file,
            DW_AT_call_line,
            DW_AT_description,
            DW_AT_binary_scale,
            DW_AT_decimal_scale,
            DW_AT_small,
            DW_AT_decimal_sign,
            DW_AT_digit_count,
            DW_AT_picture_string,
            DW_AT_mutable,
            DW_AT_threads_scaled,
            DW_AT_explicit,
            DW_AT_object_pointer,
            DW_AT_endianity,
            DW_AT_elemental,
            DW_AT_pure,
            DW_AT_recursive,
            DW_AT_signature,
            DW_AT_main_subprogram,
            DW_AT_data_bit_offset,
            DW_AT_const_expr,
            DW_AT_enum_class,
            DW_AT_linkage_name,
            DW_AT_string_length_bit_size,
            DW_AT_string_length_byte_size,
            DW_AT_rank,
            DW_AT_str_offsets_base,
            DW_AT_addr_base,
            DW_AT_rnglists_base,
            DW_AT_dwo_name,
            DW_AT_reference,
            DW_AT_rvalue_reference,
            DW_AT_macros,
            DW_AT_call_all_calls,
            DW_AT_call_all_source_calls,
            DW_AT_call_all_tail_calls,
            DW_AT_call_return_pc,
            DW_AT_call_value,
            DW_AT_call_origin,
            DW_AT_call_parameter,
            DW_AT_call_pc,
            DW_AT_call_tail_call,
            DW_AT_call_target,
            DW_AT_call_target_clobbered,
            DW_AT_call_data_location,
            DW_AT_call_data_value,
            DW_AT_noreturn,
            DW_AT_alignment,
            DW_AT_export_symbols,
            DW_AT_deleted,
            DW_AT_defaulted,
            DW_AT_loclists_base,
            DW_AT_GNU_vector,
            DW_AT_GNU_template_name,
            DW_AT_GNU_call_site_value,
            DW_AT_GNU_all_call_sites,
            DW_AT_GNU_all_tail_call_sites,
        ]
    );

    register_consts!(
        voc,
        Domain::Form,
        [
            DW_FORM_addr,
            DW_FORM_block2,
            DW_FORM_block4,
            DW_FORM_data2,
            DW_FORM_data4,
            DW_FORM_data8,
            DW_FORM_string,
            DW_FORM_block,
            DW_FORM_block1,
            DW_FORM_data1,
            DW_FORM_flag,
            DW_FORM_sdata,
            DW_FORM_strp,
            DW_FORM_udata,
            DW_FORM_ref_addr,
            DW_FORM_ref1,
            DW_FORM_ref2,
            DW_FORM_ref4,
            DW_FORM_ref8,
            DW_FORM_ref_udata,
            DW_FORM_indirect,
            DW_FORM_sec_offset,
            DW_FORM_exprloc,
            DW_FORM_flag_present,
            DW_FORM_strx,
            DW_FORM_addrx,
            DW_FORM_ref_sup4,
            DW_FORM_strp_sup,
            DW_FORM_data16,
            DW_FORM_line_strp,
            DW_FORM_ref_sig8,
            DW_FORM_implicit_const,
            DW_FORM_loclistx,
            DW_FORM_rnglistx,
            DW_FORM_ref_sup8,
            DW_FORM_strx1,
            DW_FORM_strx2,
            DW_FORM_strx3,
            DW_FORM_strx4,
            DW_FORM_addrx1,
            DW_FORM_addrx2,
            DW_FORM_addrx3,
            DW_FORM_addrx4,
            DW_FORM_GNU_addr_index,
            DW_FORM_GNU_str_index,
            DW_FORM_GNU_ref_alt,
            DW_FORM_GNU_strp_alt,
        ]
    );

    register_consts!(
        voc,
        Domain::Op,
        [
            DW_OP_addr,
            DW_OP_deref,
            DW_OP_const1u,
            DW_OP_const1s,
            DW_OP_const2u,
            DW_OP_const2s,
            DW_OP_const4u,
            DW_OP_const4s,
            DW_OP_const8u,
            DW_OP_const8s,
            DW_OP_constu,
            DW_OP_consts,
            DW_OP_dup,
            DW_OP_drop,
            DW_OP_over,
            DW_OP_pick,
            DW_OP_swap,
            DW_OP_rot,
            DW_OP_xderef,
            DW_OP_abs,
            DW_OP_and,
            DW_OP_div,
            DW_OP_minus,
            DW_OP_mod,
            DW_OP_mul,
            DW_OP_neg,
            DW_OP_not,
            DW_OP_or,
            DW_OP_plus,
            DW_OP_plus_uconst,
            DW_OP_shl,
            DW_OP_shr,
            DW_OP_shra,
            DW_OP_xor,
            DW_OP_bra,
            DW_OP_eq,
            DW_OP_ge,
            DW_OP_gt,
            DW_OP_le,
            DW_OP_lt,
            DW_OP_ne,
            DW_OP_skip,
            DW_OP_lit0,
            DW_OP_lit1,
            DW_OP_lit2,
            DW_OP_lit3,
            DW_OP_lit4,
            DW_OP_lit5,
            DW_OP_lit6,
            DW_OP_lit7,
            DW_OP_lit8,
            DW_OP_lit9,
            DW_OP_lit10,
            DW_OP_lit11,
            DW_OP_lit12,
            DW_OP_lit13,
            DW_OP_lit14,
            DW_OP_lit15,
            DW_OP_lit16,
            DW_OP_lit17,
            DW_OP_lit18,
            DW_OP_lit19,
            DW_OP_lit20,
            DW_OP_lit21,
            DW_OP_lit22,
            DW_OP_lit23,
            DW_OP_lit24,
            DW_OP_lit25,
            DW_OP_lit26,
            DW_OP_lit27,
            DW_OP_lit28,
            DW_OP_lit29,
            DW_OP_lit30,
            DW_OP_lit31,
            DW_OP_reg0,
            DW_OP_reg1,
            DW_OP_reg2,
            DW_OP_reg3,
            DW_OP_reg4,
            DW_OP_reg5,
            DW_OP_reg6,
            DW_OP_reg7,
            DW_OP_reg8,
            DW_OP_reg9,
            DW_OP_reg10,
            DW_OP_reg11,
            DW_OP_reg12,
            DW_OP_reg13,
            DW_OP_reg14,
            DW_OP_reg15,
            DW_OP_reg16,
            DW_OP_reg17,
            DW_OP_reg18,
            DW_OP_reg19,
            DW_OP_reg20,
            DW_OP_reg21,
            DW_OP_reg22,
            DW_OP_reg23,
            DW_OP_reg24,
            DW_OP_reg25,
            DW_OP_reg26,
            DW_OP_reg27,
            DW_OP_reg28,
            DW_OP_reg29,
            DW_OP_reg30,
            DW_OP_reg31,
            DW_OP_breg0,
            DW_OP_breg1,
            DW_OP_breg2,
            DW_OP_breg3,
            DW_OP_breg4,
            DW_OP_breg5,
            DW_OP_breg6,
            DW_OP_breg7,
            DW_OP_breg8,
            DW_OP_breg9,
            DW_OP_breg10,
            DW_OP_breg11,
            DW_OP_breg12,
            DW_OP_breg13,
            DW_OP_breg14,
            DW_OP_breg15,
            DW_OP_breg16,
            DW_OP_breg17,
            DW_OP_breg18,
            DW_OP_breg19,
            DW_OP_breg20,
            DW_OP_breg21,
            DW_OP_breg22,
            DW_OP_breg23,
            DW_OP_breg24,
            DW_OP_breg25,
            DW_OP_breg26,
            DW_OP_breg27,
            DW_OP_breg28,
            DW_OP_breg29,
            DW_OP_breg30,
            DW_OP_breg31,
            DW_OP_regx,
            DW_OP_fbreg,
            DW_OP_bregx,
            DW_OP_piece,
            DW_OP_deref_size,
            DW_OP_xderef_size,
            DW_OP_nop,
            DW_OP_push_object_address,
            DW_OP_call2,
            DW_OP_call4,
            DW_OP_call_ref,
            DW_OP_form_tls_address,
            DW_OP_call_frame_cfa,
            DW_OP_bit_piece,
            DW_OP_implicit_value,
            DW_OP_stack_value,
            DW_OP_implicit_pointer,
            DW_OP_addrx,
            DW_OP_constx,
            DW_OP_entry_value,
            DW_OP_const_type,
            DW_OP_regval_type,
            DW_OP_deref_type,
            DW_OP_xderef_type,
            DW_OP_convert,
            DW_OP_reinterpret,
            DW_OP_GNU_push_tls_address,
            DW_OP_GNU_implicit_pointer,
            DW_OP_GNU_entry_value,
            DW_OP_GNU_const_type,
            DW_OP_GNU_regval_type,
            DW_OP_GNU_deref_type,
            DW_OP_GNU_convert,
            DW_OP_GNU_reinterpret,
            DW_OP_GNU_parameter_ref,
        ]
    );

    register_consts!(
        voc,
        Domain::Ate,
        [
            DW_ATE_address,
            DW_ATE_boolean,
            DW_ATE_complex_float,
            DW_ATE_float,
            DW_ATE_signed,
            DW_ATE_signed_char,
            DW_ATE_unsigned,
            DW_ATE_unsigned_char,
            DW_ATE_imaginary_float,
            DW_ATE_packed_decimal,
            DW_ATE_numeric_string,
            DW_ATE_edited,
            DW_ATE_signed_fixed,
            DW_ATE_unsigned_fixed,
            DW_ATE_decimal_float,
            DW_ATE_UTF,
            DW_ATE_UCS,
            DW_ATE_ASCII,
        ]
    );

    register_consts!(
        voc,
        Domain::Lang,
        [
            DW_LANG_C89,
            DW_LANG_C,
            DW_LANG_Ada83,
            DW_LANG_C_plus_plus,
            DW_LANG_Cobol74,
            DW_LANG_Cobol85,
            DW_LANG_Fortran77,
            DW_LANG_Fortran90,
            DW_LANG_Pascal83,
            DW_LANG_Modula2,
            DW_LANG_Java,
            DW_LANG_C99,
            DW_LANG_Ada95,
            DW_LANG_Fortran95,
            DW_LANG_PLI,
            DW_LANG_ObjC,
            DW_LANG_ObjC_plus_plus,
            DW_LANG_UPC,
            DW_LANG_D,
            DW_LANG_Python,
            DW_LANG_OpenCL,
            DW_LANG_Go,
            DW_LANG_Modula3,
            DW_LANG_Haskell,
            DW_LANG_C_plus_plus_03,
            DW_LANG_C_plus_plus_11,
            DW_LANG_OCaml,
            DW_LANG_Rust,
            DW_LANG_C11,
            DW_LANG_Swift,
            DW_LANG_Julia,
            DW_LANG_Dylan,
            DW_LANG_C_plus_plus_14,
            DW_LANG_Fortran03,
            DW_LANG_Fortran08,
            DW_LANG_RenderScript,
            DW_LANG_BLISS,
        ]
    );

    register_consts!(
        voc,
        Domain::Inl,
        [
            DW_INL_not_inlined,
            DW_INL_inlined,
            DW_INL_declared_not_inlined,
            DW_INL_declared_inlined,
        ]
    );
}
