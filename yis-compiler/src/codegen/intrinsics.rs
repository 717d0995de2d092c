// Bridge to the GUI framework's native side.
// The emitter recognizes these reserved identifiers and lowers each to
// one runtime call: arguments evaluate in source order into temporaries,
// the symbol is called, the temporaries are released, and the result is
// either null (void intrinsics) or a new retained value. Adding an
// intrinsic is one table entry.

pub struct Intrinsic {
    /// Reserved identifier as it appears in source (`__cogito_*`).
    pub name: &'static str,
    /// Runtime symbol to call.
    pub symbol: &'static str,
    pub arity: usize,
    pub returns_value: bool,
}

const fn val(name: &'static str, symbol: &'static str, arity: usize) -> Intrinsic {
    Intrinsic {
        name,
        symbol,
        arity,
        returns_value: true,
    }
}

const fn void(name: &'static str, symbol: &'static str, arity: usize) -> Intrinsic {
    Intrinsic {
        name,
        symbol,
        arity,
        returns_value: false,
    }
}

pub static INTRINSICS: &[Intrinsic] = &[
    // widget constructors
    val("__cogito_app", "cogito_app_new", 0),
    val("__cogito_window", "cogito_window_new", 3),
    val("__cogito_button", "cogito_button_new", 1),
    val("__cogito_iconbtn", "cogito_iconbtn_new", 1),
    val("__cogito_label", "cogito_label_new", 1),
    val("__cogito_dialog", "cogito_dialog_new", 1),
    val("__cogito_dialog_slot", "cogito_dialog_slot_new", 0),
    val("__cogito_image", "cogito_image_new", 1),
    val("__cogito_checkbox", "cogito_checkbox_new", 2),
    val("__cogito_switch", "cogito_switch_new", 1),
    val("__cogito_textfield", "cogito_textfield_new", 1),
    val("__cogito_searchfield", "cogito_searchfield_new", 1),
    val("__cogito_textview", "cogito_textview_new", 1),
    val("__cogito_dropdown", "cogito_dropdown_new", 0),
    val("__cogito_datepicker", "cogito_datepicker_new", 0),
    val("__cogito_stepper", "cogito_stepper_new", 4),
    val("__cogito_slider", "cogito_slider_new", 3),
    val("__cogito_tabs", "cogito_tabs_new", 0),
    val("__cogito_segmented", "cogito_segmented_new", 0),
    val("__cogito_view_switcher", "cogito_view_switcher_new", 0),
    val("__cogito_progress", "cogito_progress_new", 1),
    val("__cogito_treeview", "cogito_treeview_new", 0),
    val("__cogito_colorpicker", "cogito_colorpicker_new", 0),
    val("__cogito_toasts", "cogito_toasts_new", 0),
    val("__cogito_toast", "cogito_toast_new", 1),
    val("__cogito_appbar", "cogito_appbar_new", 2),
    val("__cogito_toolbar", "cogito_toolbar_new", 0),
    // layout containers
    val("__cogito_vstack", "cogito_vstack_new", 0),
    val("__cogito_hstack", "cogito_hstack_new", 0),
    val("__cogito_zstack", "cogito_zstack_new", 0),
    val("__cogito_fixed", "cogito_fixed_new", 0),
    val("__cogito_scroller", "cogito_scroller_new", 0),
    val("__cogito_list", "cogito_list_new", 0),
    val("__cogito_grid", "cogito_grid_new", 1),
    void("__cogito_container_add", "cogito_container_add", 2),
    void("__cogito_container_set_margins", "cogito_container_set_margins", 5),
    void("__cogito_container_set_padding", "cogito_container_set_padding", 5),
    void("__cogito_container_set_align", "cogito_container_set_align", 2),
    void("__cogito_container_set_halign", "cogito_container_set_halign", 2),
    void("__cogito_container_set_valign", "cogito_container_set_valign", 2),
    void("__cogito_container_set_hexpand", "cogito_container_set_hexpand", 2),
    void("__cogito_container_set_vexpand", "cogito_container_set_vexpand", 2),
    void("__cogito_fixed_set_pos", "cogito_fixed_set_pos", 4),
    void("__cogito_scroller_set_axes", "cogito_scroller_set_axes", 3),
    void("__cogito_grid_set_gap", "cogito_grid_set_gap", 3),
    void("__cogito_grid_set_span", "cogito_grid_set_span", 3),
    void("__cogito_grid_set_align", "cogito_grid_set_align", 3),
    // node attributes
    void("__cogito_node_set_disabled", "cogito_node_set_disabled", 2),
    void("__cogito_node_set_id", "cogito_node_set_id", 2),
    void("__cogito_node_set_class", "cogito_node_set_class", 2),
    void("__cogito_node_set_a11y_label", "cogito_node_set_a11y_label", 2),
    void("__cogito_node_set_a11y_role", "cogito_node_set_a11y_role", 2),
    void("__cogito_node_set_tooltip", "cogito_node_set_tooltip_val", 2),
    val("__cogito_node_window", "cogito_node_window_val", 1),
    // labels
    void("__cogito_label_set_class", "cogito_label_set_class", 2),
    void("__cogito_label_set_wrap", "cogito_label_set_wrap", 2),
    void("__cogito_label_set_ellipsis", "cogito_label_set_ellipsis", 2),
    void("__cogito_label_set_align", "cogito_label_set_align", 2),
    // app & window
    void("__cogito_app_set_appid", "cogito_app_set_appid", 2),
    void("__cogito_app_set_accent_color", "cogito_app_set_accent_color", 3),
    void("__cogito_window_set_autosize", "cogito_window_set_autosize", 2),
    void("__cogito_window_set_resizable", "cogito_window_set_resizable", 2),
    void("__cogito_window_set_dialog", "cogito_window_set_dialog", 2),
    void("__cogito_window_clear_dialog", "cogito_window_clear_dialog", 1),
    void("__cogito_window_set_builder", "cogito_window_set_builder", 2),
    void("__cogito_build", "cogito_build", 2),
    void("__cogito_dialog_slot_show", "cogito_dialog_slot_show", 2),
    void("__cogito_dialog_slot_clear", "cogito_dialog_slot_clear", 1),
    // pointer capture
    void("__cogito_pointer_capture", "cogito_pointer_capture_set", 1),
    void("__cogito_pointer_release", "cogito_pointer_capture_clear", 0),
    // state cells
    val("__cogito_state_new", "cogito_state_new", 1),
    val("__cogito_state_get", "cogito_state_get", 1),
    void("__cogito_state_set", "cogito_state_set", 2),
    // widget state
    void("__cogito_button_set_text", "cogito_button_set_text", 2),
    void("__cogito_image_set_icon", "cogito_image_set_icon", 2),
    void("__cogito_checkbox_set_checked", "cogito_checkbox_set_checked", 2),
    val("__cogito_checkbox_get_checked", "cogito_checkbox_get_checked", 1),
    void("__cogito_switch_set_checked", "cogito_switch_set_checked", 2),
    val("__cogito_switch_get_checked", "cogito_switch_get_checked", 1),
    void("__cogito_textfield_set_text", "cogito_textfield_set_text", 2),
    val("__cogito_textfield_get_text", "cogito_textfield_get_text", 1),
    void("__cogito_searchfield_set_text", "cogito_searchfield_set_text", 2),
    val("__cogito_searchfield_get_text", "cogito_searchfield_get_text", 1),
    void("__cogito_textview_set_text", "cogito_textview_set_text", 2),
    val("__cogito_textview_get_text", "cogito_textview_get_text", 1),
    void("__cogito_dropdown_set_items", "cogito_dropdown_set_items", 2),
    void("__cogito_dropdown_set_selected", "cogito_dropdown_set_selected", 2),
    val("__cogito_dropdown_get_selected", "cogito_dropdown_get_selected", 1),
    void("__cogito_slider_set_value", "cogito_slider_set_value", 2),
    val("__cogito_slider_get_value", "cogito_slider_get_value", 1),
    void("__cogito_tabs_set_items", "cogito_tabs_set_items", 2),
    void("__cogito_tabs_set_ids", "cogito_tabs_set_ids", 2),
    void("__cogito_tabs_set_selected", "cogito_tabs_set_selected", 2),
    val("__cogito_tabs_get_selected", "cogito_tabs_get_selected", 1),
    void("__cogito_tabs_bind", "cogito_tabs_bind", 2),
    void("__cogito_view_switcher_set_active", "cogito_view_switcher_set_active", 2),
    void("__cogito_progress_set_value", "cogito_progress_set_value", 2),
    val("__cogito_progress_get_value", "cogito_progress_get_value", 1),
    void("__cogito_toast_set_text", "cogito_toast_set_text", 2),
    // event hooks
    void("__cogito_button_on_click", "cogito_button_on_click", 2),
    void("__cogito_button_add_menu", "cogito_button_add_menu", 3),
    void("__cogito_iconbtn_add_menu", "cogito_iconbtn_add_menu", 3),
    val("__cogito_appbar_add_button", "cogito_appbar_add_button", 3),
    void("__cogito_appbar_set_controls", "cogito_appbar_set_controls", 2),
    void("__cogito_checkbox_on_change", "cogito_checkbox_on_change", 2),
    void("__cogito_switch_on_change", "cogito_switch_on_change", 2),
    void("__cogito_textfield_on_change", "cogito_textfield_on_change", 2),
    void("__cogito_searchfield_on_change", "cogito_searchfield_on_change", 2),
    void("__cogito_textview_on_change", "cogito_textview_on_change", 2),
    void("__cogito_datepicker_on_change", "cogito_datepicker_on_change", 2),
    void("__cogito_dropdown_on_change", "cogito_dropdown_on_change", 2),
    void("__cogito_slider_on_change", "cogito_slider_on_change", 2),
    void("__cogito_colorpicker_on_change", "cogito_colorpicker_on_change", 2),
    void("__cogito_tabs_on_change", "cogito_tabs_on_change", 2),
    void("__cogito_toast_on_click", "cogito_toast_on_click", 2),
    void("__cogito_list_on_select", "cogito_list_on_select", 2),
    void("__cogito_list_on_activate", "cogito_list_on_activate", 2),
    void("__cogito_grid_on_select", "cogito_grid_on_select", 2),
    void("__cogito_grid_on_activate", "cogito_grid_on_activate", 2),
    // main loop and theme loading
    void("__cogito_run", "cogito_run", 2),
    void("__cogito_load_sum", "cogito_load_sum", 1),
];

pub fn find_intrinsic(name: &str) -> Option<&'static Intrinsic> {
    INTRINSICS.iter().find(|i| i.name == name)
}

/// Extern declarations for every bridged symbol, emitted right after
/// the runtime prelude so call sites need no per-use declarations.
pub fn extern_decls() -> String {
    let mut out = String::new();
    out.push_str("// ---- GUI intrinsic externs ----\n");
    for i in INTRINSICS {
        let ret = if i.returns_value { "ErgoVal" } else { "void" };
        let params = if i.arity == 0 {
            "void".to_string()
        } else {
            (0..i.arity)
                .map(|_| "ErgoVal")
                .collect::<Vec<_>>()
                .join(", ")
        };
        out.push_str(&format!("extern {} {}({});\n", ret, i.symbol, params));
    }
    out
}
