//! Counter window driven by a shared signal.
//!
//! The count lives in a signal outside the view. The view reads it through
//! `cx.use_signal`, so clicking the button writes the signal and GPUI
//! re-renders the window. A devtool mirrors the count to the log.
//!
//! Run with: cargo run --example counter --features gpui

use gpui::*;
use gpui_signal_bridge::devtools::{install_document, HeadlessDocument};
use gpui_signal_bridge::prelude::*;
use gpui_signal_bridge::mount_store_devtool;
use std::rc::Rc;

struct Counter {
    count: Signal<i32>,
    doubled: Computed<i32>,
}

impl Counter {
    fn new(count: Signal<i32>, cx: &mut Context<Self>) -> Self {
        let doubled = create_computed(move || count.get() * 2);
        cx.use_signal_effect(move || tracing::info!(count = count.get(), "count changed"));
        Self { count, doubled }
    }
}

fn button(label: &'static str, on_click: impl Fn() + 'static) -> impl IntoElement {
    div()
        .id(label)
        .bg(rgb(0x3a3a3a))
        .border_1()
        .border_color(rgb(0x4f4f4f))
        .rounded_md()
        .px_4()
        .py_2()
        .text_sm()
        .font_weight(FontWeight::BOLD)
        .text_color(rgb(0xffffff))
        .child(label)
        .on_click(move |_, _, _| on_click())
}

impl Render for Counter {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let (count, set_count) = cx.use_signal(&self.count);
        let doubled = cx.use_signal_value(&self.doubled);
        let reset = set_count.clone();

        div()
            .flex()
            .flex_col()
            .gap_6()
            .p_8()
            .bg(rgb(0x2d2d2d))
            .text_color(rgb(0xffffff))
            .size_full()
            .child(div().text_2xl().font_weight(FontWeight::BOLD).child(format!("count is {count}")))
            .child(div().text_lg().text_color(rgb(0x50fa7b)).child(format!("doubled is {doubled}")))
            .child(
                div()
                    .flex()
                    .gap_3()
                    .child(button("+1", move || set_count.update(|n| n + 1)))
                    .child(button("Reset", move || reset.set(0))),
            )
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let count = create_signal(0);
    install_document(Rc::new(HeadlessDocument::new()));
    mount_store_devtool("count", &count, None);

    Application::new().run(move |cx: &mut App| {
        let bounds = Bounds::centered(None, Size::new(px(400.0), px(240.0)), cx);
        cx.open_window(
            WindowOptions {
                window_bounds: Some(WindowBounds::Windowed(bounds)),
                ..Default::default()
            },
            |_window, cx| cx.new(|cx| Counter::new(count, cx)),
        )
        .unwrap();
        cx.activate(true);
    });
}
