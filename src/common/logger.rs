use colored::*;

/// 命令行输出工具
pub struct PrettyLogger;

impl PrettyLogger {
    /// 显示成功消息
    pub fn success(message: impl AsRef<str>) {
        println!("{}", Self::line("✓".green().bold(), message.as_ref()));
    }

    /// 显示信息消息
    pub fn info(message: impl AsRef<str>) {
        println!("{}", Self::line("ℹ".blue().bold(), message.as_ref()));
    }

    /// 显示警告消息
    pub fn warning(message: impl AsRef<str>) {
        println!("{}", Self::line("⚠".yellow().bold(), message.as_ref()));
    }

    /// 显示错误消息
    pub fn error(message: impl AsRef<str>) {
        eprintln!("{}", Self::line("✗".red().bold(), message.as_ref()));
    }

    fn line(symbol: ColoredString, message: &str) -> String {
        format!("{} {}", symbol, message)
    }

    /// 显示任务配置
    pub fn job_info(label: impl AsRef<str>, value: impl AsRef<str>) {
        println!("{} {}: {}", "📁".blue().bold(), label.as_ref().bold(), value.as_ref());
    }

    /// 显示标题
    pub fn title(text: impl AsRef<str>) {
        let text = text.as_ref();
        let width = text.chars().count().min(48);
        let padding = (48 - width) / 2;
        println!(
            "{} {} {}",
            "─".repeat(padding).bright_black(),
            text.bold(),
            "─".repeat(48 - padding - width).bright_black()
        );
    }

    /// 显示完成总结
    pub fn completion_summary(items: Vec<impl AsRef<str>>) {
        println!("\n{}", "🎉 下载完成！".green().bold());
        for item in items {
            println!("  {}", item.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_keeps_message_after_symbol() {
        colored::control::set_override(false);
        assert_eq!(PrettyLogger::line("✓".green().bold(), "已提交 5 个列表页"), "✓ 已提交 5 个列表页");
        assert_eq!(PrettyLogger::line("✗".red().bold(), "创建下载器失败"), "✗ 创建下载器失败");
    }
}
