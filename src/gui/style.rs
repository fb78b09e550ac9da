use iced::widget::button::{Appearance, StyleSheet};
use iced::{Background, Border, Color, Shadow, Theme};

pub struct DeviceRowStyleSheet;

impl StyleSheet for DeviceRowStyleSheet {
    type Style = Theme;

    fn active(&self, _style: &Self::Style) -> Appearance {
        Appearance {
            shadow_offset: Default::default(),
            background: Some(Background::Color(Color::from_rgb(0.93, 0.93, 0.93))),
            text_color: Color::BLACK,
            border: Border {
                color: Color::from_rgb(0.75, 0.75, 0.75),
                width: 1.0,
                radius: 2.0.into(),
            },
            shadow: Shadow::default(),
        }
    }

    fn hovered(&self, style: &Self::Style) -> Appearance {
        Appearance {
            background: Some(Background::Color(Color::from_rgb(0.85, 0.90, 0.96))),
            ..self.active(style)
        }
    }
}
