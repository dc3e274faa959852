use ratatui::style::Color;

/// Colors shared by every pane
pub struct Theme {
    pub fg: Color,
    pub primary: Color,
    pub secondary: Color,
    pub comment: Color,
    pub success: Color,
    pub error: Color,
    pub keyword: Color,
    pub string: Color,
    pub number: Color,
    pub border_focused: Color,
    pub border_normal: Color,
    pub current_line_bg: Color,
    pub function: Color,
    /// File-scope frame header
    pub muted_function: Color,
    pub type_name: Color,
}

pub const DEFAULT_THEME: Theme = Theme {
    fg: Color::Rgb(205, 214, 244),
    primary: Color::Rgb(137, 180, 250),   // blue
    secondary: Color::Rgb(250, 179, 135), // orange
    comment: Color::Rgb(108, 112, 134),
    success: Color::Rgb(166, 227, 161),
    error: Color::Rgb(243, 139, 168),
    keyword: Color::Rgb(137, 180, 250),
    string: Color::Rgb(250, 179, 135),
    number: Color::Rgb(250, 179, 135),
    border_focused: Color::Rgb(249, 226, 175),
    border_normal: Color::Rgb(108, 112, 134),
    current_line_bg: Color::Rgb(50, 50, 70),
    function: Color::Rgb(249, 226, 175),
    muted_function: Color::Rgb(180, 165, 120),
    type_name: Color::Rgb(148, 226, 213),
};
